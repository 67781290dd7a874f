//! # lentil-cli: command-line client for beanstalkd
//!
//! Thin front end over `lentil-core`: each subcommand opens one
//! connection, performs a single queue operation (or a `drain` loop) and
//! prints the result as text or JSON.

pub mod commands;
pub mod config;
