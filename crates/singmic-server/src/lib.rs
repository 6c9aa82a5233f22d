pub mod cli;
pub mod config;
pub mod console;
pub mod engine;
pub mod runtime;
pub mod transport;

mod capture;
mod session;
