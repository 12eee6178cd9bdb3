// Idiomatic Rust CLI for Oxirdb.
//
// Uses explicit subcommands and long-form options while preserving
// the underlying decode/list/restore behavior.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::filter::GlobFilter;
use crate::io::IoError;
use crate::output::{JsonWriter, KeysWriter, RestoreWriter};
use crate::rdb::{Decoder, ParseError, Step};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Reader for Redis RDB snapshots and DUMP payloads.
#[derive(Parser, Debug)]
#[command(
    name = "oxirdb",
    version,
    about = "Decode RDB snapshots and DUMP payloads",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output run stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render every record as one JSON object on stdout.
    Json(JsonArgs),
    /// List keys, one per line.
    Keys(KeysArgs),
    /// Emit RESP RESTORE commands for piping into redis-cli.
    Restore(RestoreArgs),
    /// Validate inputs and print a per-file summary.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input file (default: stdin).
    #[arg(short = 'f', long = "file", value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    file: Option<PathBuf>,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Glob pattern keys must match (`*`, `?`, `[classes]`, `\` escapes).
    #[arg(short = 'e', long = "pattern")]
    pattern: Option<String>,

    /// Select the keys the pattern does NOT match.
    #[arg(long, requires = "pattern")]
    invert: bool,

    /// Match case-insensitively (ASCII).
    #[arg(short = 'i', long = "ignore-case", requires = "pattern")]
    ignore_case: bool,
}

#[derive(Args, Debug)]
struct JsonArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    filter: FilterArgs,

    /// Include idle/freq/aux/expiry/db metadata in the output.
    #[arg(short = 'm', long)]
    meta: bool,
}

#[derive(Args, Debug)]
struct KeysArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    filter: FilterArgs,

    /// Append REPLACE so existing keys are overwritten on load.
    #[arg(long)]
    replace: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Input files (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Json,
    Keys,
    Restore,
    Check,
}

struct Options {
    command: Command,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    pattern: Option<String>,
    invert: bool,
    ignore_case: bool,
    show_meta: bool,
    replace: bool,
    input_file: Option<PathBuf>,
    check_files: Vec<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let quiet = cli.quiet;
    let verbose = cli.verbose.min(2);
    let json_output = cli.json_output;

    match cli.command {
        Cmd::Json(args) => Options {
            command: Command::Json,
            quiet,
            verbose,
            json_output,
            pattern: args.filter.pattern,
            invert: args.filter.invert,
            ignore_case: args.filter.ignore_case,
            show_meta: args.meta,
            replace: false,
            input_file: args.input.file.or(args.input.input_pos),
            check_files: Vec::new(),
        },
        Cmd::Keys(args) => Options {
            command: Command::Keys,
            quiet,
            verbose,
            json_output,
            pattern: args.filter.pattern,
            invert: args.filter.invert,
            ignore_case: args.filter.ignore_case,
            show_meta: false,
            replace: false,
            input_file: args.input.file.or(args.input.input_pos),
            check_files: Vec::new(),
        },
        Cmd::Restore(args) => Options {
            command: Command::Restore,
            quiet,
            verbose,
            json_output,
            pattern: args.filter.pattern,
            invert: args.filter.invert,
            ignore_case: args.filter.ignore_case,
            show_meta: false,
            replace: args.replace,
            input_file: args.input.file.or(args.input.input_pos),
            check_files: Vec::new(),
        },
        Cmd::Check(args) => Options {
            command: Command::Check,
            quiet,
            verbose,
            json_output,
            pattern: None,
            invert: false,
            ignore_case: false,
            show_meta: false,
            replace: false,
            input_file: None,
            check_files: args.files,
        },
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxirdb".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared input/error plumbing
// ---------------------------------------------------------------------------

fn build_filter(opts: &Options) -> Option<GlobFilter> {
    opts.pattern.as_ref().map(|p| {
        GlobFilter::new(p.as_bytes())
            .ignore_case(opts.ignore_case)
            .invert(opts.invert)
    })
}

fn report_input_error(path: Option<&Path>, e: &IoError) {
    match path {
        Some(p) => eprintln!("oxirdb: {}: {e}", p.display()),
        None => eprintln!("oxirdb: stdin: {e}"),
    }
}

/// Error description, then a hex dump of the bytes around the failure.
fn report_parse_error(input: &[u8], offset: u64, e: &ParseError) {
    eprintln!("oxirdb: decode failed at offset {offset}: {e}");
    eprint!("{}", crate::io::hex_window(input, offset));
}

// ---------------------------------------------------------------------------
// Json command
// ---------------------------------------------------------------------------

fn cmd_json(opts: &Options) -> i32 {
    let input = match crate::io::read_input(opts.input_file.as_deref()) {
        Ok(data) => data,
        Err(e) => {
            report_input_error(opts.input_file.as_deref(), &e);
            return 1;
        }
    };

    let filter = build_filter(opts);
    let writer = JsonWriter::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()))
        .show_meta(opts.show_meta);

    let mut dec = Decoder::new(input.clone(), writer);
    if let Some(ref f) = filter {
        dec = dec.with_filter(f);
    }

    let outcome = dec.decode_all();
    let offset = dec.position();
    let keys = dec.key_count();
    let write_status = dec.into_sink().into_inner().and_then(|mut w| w.flush());

    if let Err(e) = outcome {
        report_parse_error(&input, offset, &e);
        return 1;
    }
    if let Err(e) = write_status {
        eprintln!("oxirdb: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("oxirdb: decoder: keys: {keys}, input size: {}", input.len());
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "json",
            "keys": keys,
            "input_size": input.len(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Keys command
// ---------------------------------------------------------------------------

fn cmd_keys(opts: &Options) -> i32 {
    let input = match crate::io::read_input(opts.input_file.as_deref()) {
        Ok(data) => data,
        Err(e) => {
            report_input_error(opts.input_file.as_deref(), &e);
            return 1;
        }
    };

    let filter = build_filter(opts);
    let writer = KeysWriter::new(BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()));

    let mut dec = Decoder::new(input.clone(), writer);
    if let Some(ref f) = filter {
        dec = dec.with_filter(f);
    }

    let outcome = dec.decode_all();
    let offset = dec.position();
    let writer = dec.into_sink();
    let count = writer.count();
    let write_status = writer.into_inner().and_then(|mut w| w.flush());

    if let Err(e) = outcome {
        report_parse_error(&input, offset, &e);
        return 1;
    }
    if let Err(e) = write_status {
        eprintln!("oxirdb: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxirdb: decoder: keys listed: {count}, input size: {}",
            input.len()
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "keys",
            "keys": count,
            "input_size": input.len(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Restore command
// ---------------------------------------------------------------------------

fn cmd_restore(opts: &Options) -> i32 {
    let input = match crate::io::read_input(opts.input_file.as_deref()) {
        Ok(data) => data,
        Err(e) => {
            report_input_error(opts.input_file.as_deref(), &e);
            return 1;
        }
    };

    let filter = build_filter(opts);
    let writer = RestoreWriter::new(
        input.clone(),
        BufWriter::with_capacity(BUF_SIZE, io::stdout().lock()),
    )
    .replace(opts.replace);

    let mut dec = Decoder::new(input.clone(), writer);
    if let Some(ref f) = filter {
        dec = dec.with_filter(f);
    }

    // The record span is only known once the decoder has moved past it,
    // so commands are written between steps rather than from sink hooks.
    loop {
        match dec.decode_record() {
            Ok(Step::Key) => {
                let end = dec.position();
                let container = dec.is_container();
                if let Err(e) = dec.sink_mut().emit(end, container) {
                    eprintln!("oxirdb: write error: {e}");
                    return 1;
                }
                if !container && dec.at_end() {
                    break;
                }
            }
            Ok(Step::Eof) => break,
            Err(e) => {
                let offset = dec.position();
                report_parse_error(&input, offset, &e);
                return 1;
            }
        }
    }

    let writer = dec.into_sink();
    let count = writer.count();
    if let Err(e) = writer.into_inner().flush() {
        eprintln!("oxirdb: write error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxirdb: restore: commands: {count}, input size: {}",
            input.len()
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "restore",
            "commands": count,
            "input_size": input.len(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Check command
// ---------------------------------------------------------------------------

struct CheckReport {
    code: i32,
    /// Per-file stdout line: human summary, or one compact JSON object.
    line: String,
    /// Stderr diagnostics, empty on success.
    diag: String,
}

impl CheckReport {
    fn failed(label: &str, json: bool, err: &IoError, input: Option<&[u8]>) -> CheckReport {
        let line = if json {
            let j = serde_json::json!({
                "file": label,
                "ok": false,
                "error": err.to_string(),
            });
            format!("{j}\n")
        } else {
            String::new()
        };
        let mut diag = format!("oxirdb: {label}: {err}\n");
        if let (IoError::Parse { offset, .. }, Some(bytes)) = (err, input) {
            diag.push_str(&crate::io::hex_window(bytes, *offset));
        }
        CheckReport {
            code: 1,
            line,
            diag,
        }
    }
}

fn hex_string(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn check_one(path: Option<&Path>, json: bool) -> CheckReport {
    let label = match path {
        Some(p) => p.display().to_string(),
        None => "-".to_string(),
    };

    let input = match crate::io::read_input(path) {
        Ok(data) => data,
        Err(e) => return CheckReport::failed(&label, json, &e, None),
    };

    match crate::io::scan_input(&input) {
        Ok(stats) => {
            let line = if json {
                let j = serde_json::json!({
                    "file": label,
                    "ok": true,
                    "container": stats.container,
                    "version": stats.version,
                    "keys": stats.keys,
                    "input_size": stats.input_size,
                    "crc64": format!("{:#018x}", stats.trailer_crc),
                    "sha256": stats.sha256.map(|d| hex_string(&d)),
                });
                format!("{j}\n")
            } else {
                use std::fmt::Write as _;
                let mut line = format!(
                    "{label}: ok: {} version {}, {} keys, {} bytes",
                    if stats.container { "container" } else { "dump" },
                    stats.version,
                    stats.keys,
                    stats.input_size
                );
                if stats.trailer_crc != 0 {
                    let _ = write!(line, ", crc64 {:#018x}", stats.trailer_crc);
                }
                if let Some(d) = stats.sha256 {
                    let _ = write!(line, ", sha256 {}", hex_string(&d));
                }
                line.push('\n');
                line
            };
            CheckReport {
                code: 0,
                line,
                diag: String::new(),
            }
        }
        Err(e) => CheckReport::failed(&label, json, &e, Some(&input)),
    }
}

fn cmd_check(opts: &Options) -> i32 {
    let reports: Vec<CheckReport> = if opts.check_files.is_empty() {
        vec![check_one(None, opts.json_output)]
    } else {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            opts.check_files
                .par_iter()
                .map(|p| check_one(Some(p), opts.json_output))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            opts.check_files
                .iter()
                .map(|p| check_one(Some(p), opts.json_output))
                .collect()
        }
    };

    let mut code = 0;
    for report in &reports {
        print!("{}", report.line);
        if !report.diag.is_empty() {
            eprint!("{}", report.diag);
        }
        if report.code != 0 {
            code = report.code;
        }
    }

    if opts.verbose > 0 && !opts.quiet && reports.len() > 1 {
        let failed = reports.iter().filter(|r| r.code != 0).count();
        eprintln!("oxirdb: check: files: {}, failed: {failed}", reports.len());
    }

    code
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let exit_code = match opts.command {
        Command::Json => cmd_json(&opts),
        Command::Keys => cmd_keys(&opts),
        Command::Restore => cmd_restore(&opts),
        Command::Check => cmd_check(&opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("oxirdb".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    fn parse_err(args: &[&str]) -> bool {
        let argv: Vec<String> = std::iter::once("oxirdb".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        Cli::try_parse_from(argv).is_err()
    }

    #[test]
    fn json_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "json",
            "--meta",
            "-e",
            "user:*",
            "--invert",
            "-i",
            "dump.rdb",
        ]);
        assert_eq!(opts.command, Command::Json);
        assert!(opts.show_meta);
        assert_eq!(opts.pattern.as_deref(), Some("user:*"));
        assert!(opts.invert);
        assert!(opts.ignore_case);
        assert_eq!(opts.input_file, Some(PathBuf::from("dump.rdb")));
    }

    #[test]
    fn file_flag_and_positional_are_alternatives() {
        let opts = parse_opts(&["keys", "--file", "a.rdb"]);
        assert_eq!(opts.input_file, Some(PathBuf::from("a.rdb")));
        let opts = parse_opts(&["keys", "a.rdb"]);
        assert_eq!(opts.input_file, Some(PathBuf::from("a.rdb")));
        assert!(parse_err(&["keys", "--file", "a.rdb", "b.rdb"]));
    }

    #[test]
    fn stdin_is_the_default_input() {
        let opts = parse_opts(&["keys"]);
        assert_eq!(opts.command, Command::Keys);
        assert_eq!(opts.input_file, None);
    }

    #[test]
    fn restore_subcommand_maps_correctly() {
        let opts = parse_opts(&["restore", "--replace", "-f", "d.rdb"]);
        assert_eq!(opts.command, Command::Restore);
        assert!(opts.replace);
        assert_eq!(opts.input_file, Some(PathBuf::from("d.rdb")));

        let opts = parse_opts(&["restore", "-f", "d.rdb"]);
        assert!(!opts.replace);
    }

    #[test]
    fn check_collects_files() {
        let opts = parse_opts(&["check", "a.rdb", "b.rdb"]);
        assert_eq!(opts.command, Command::Check);
        assert_eq!(
            opts.check_files,
            vec![PathBuf::from("a.rdb"), PathBuf::from("b.rdb")]
        );

        let opts = parse_opts(&["check"]);
        assert!(opts.check_files.is_empty());
    }

    #[test]
    fn global_flags_resolve() {
        let opts = parse_opts(&["--json", "keys", "-f", "x.rdb"]);
        assert!(opts.json_output);
        let opts = parse_opts(&["-q", "json"]);
        assert!(opts.quiet);
    }

    #[test]
    fn verbose_is_capped() {
        let opts = parse_opts(&["-v", "-v", "-v", "keys"]);
        assert_eq!(opts.verbose, 2);
    }

    #[test]
    fn invert_requires_a_pattern() {
        assert!(parse_err(&["keys", "--invert"]));
        assert!(parse_err(&["json", "-i"]));
        let opts = parse_opts(&["keys", "-e", "a*", "--invert"]);
        assert!(opts.invert);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(parse_err(&["-q", "-v", "keys"]));
    }

    #[test]
    fn filters_build_from_options() {
        let opts = parse_opts(&["keys", "-e", "user:*"]);
        assert!(build_filter(&opts).is_some());
        let opts = parse_opts(&["keys"]);
        assert!(build_filter(&opts).is_none());
    }

    #[test]
    fn hex_string_renders_lowercase() {
        assert_eq!(hex_string(&[0x00, 0xAB, 0x7F]), "00ab7f");
    }
}
