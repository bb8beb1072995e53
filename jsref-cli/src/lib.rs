//! Command-line front end for jsref.

pub mod cli;
pub mod config;
pub mod exception;
pub mod logging;
