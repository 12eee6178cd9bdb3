//! Oxirdb: Redis RDB snapshot and DUMP payload decoding in Rust.
//!
//! The crate provides:
//! - A pure-Rust streaming record decoder and its `Sink` trait (`rdb`)
//! - Glob-based key selection (`filter`)
//! - JSON, key-listing, and RESTORE renderers (`output`)
//! - Input acquisition and scan helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxirdb::output::JsonWriter;
//! use oxirdb::rdb::Decoder;
//!
//! let input = oxirdb::io::read_input(Some("dump.rdb".as_ref())).unwrap();
//! let sink = JsonWriter::new(std::io::stdout().lock());
//!
//! let mut dec = Decoder::new(input, sink);
//! dec.decode_all().unwrap();
//! ```

pub mod filter;
pub mod io;
pub mod output;
pub mod rdb;

#[cfg(feature = "cli")]
pub mod cli;
