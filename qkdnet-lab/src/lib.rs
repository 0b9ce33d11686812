//! Library surface for the `qkdnet-lab` binary.
//!
//! Config parsing and the run loop live here so tests and the demos link
//! against the same code the CLI drives.

pub mod config;
pub mod service;
