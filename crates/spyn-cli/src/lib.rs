//! spyn CLI crate
//!
//! Command-line front end to the synfire integration harness:
//!
//! - `run`: execute a synfire scenario from TOML, optionally retrying
//!   transient failures, and write the recorded block
//! - `check`: round-robin spike order check of a block or legacy dump
//! - `compare`: structural comparison of two block files
//! - `convert`: block to legacy text dump
//!
//! The binary (src/main.rs) wires up logging and argument parsing, then calls
//! [`SpynCli::execute`]. The library surface exists so commands can be driven
//! from tests without a separate process.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::SpynCli;
