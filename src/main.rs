fn main() {
    #[cfg(feature = "cli")]
    oxirdb::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oxirdb: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
