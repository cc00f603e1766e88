//! Command-line interface for the `lesim` binary.

pub mod args;
pub mod commands;
