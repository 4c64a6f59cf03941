// Public API - the runner plus the types needed to configure it
pub mod calendar;
pub mod config;
pub mod error;
pub mod runner;

// Internal modules - organized by subsystem
mod db;
mod io;
mod pipeline;
mod secrets;
mod session;
mod telemetry;

#[cfg(test)]
mod integ_tests;
