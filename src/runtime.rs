//! Runtime glue: options, telemetry, and the runner that hosts a worker in a process.

pub mod config;
pub mod runner;
pub mod telemetry;
