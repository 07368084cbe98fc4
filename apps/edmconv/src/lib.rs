//! # edmconv
//!
//! Command-line front end of the converter: input loading, the worker pool
//! that feeds events to `EventAssembler`s, and inspection of written files.

pub mod cli;
pub mod input;
