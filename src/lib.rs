pub mod common;
pub mod config;
pub mod utils;
pub mod workflow;
