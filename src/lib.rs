pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod search;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::StormError;
pub use generator::workflow::{Command, RunOptions, StormRunner, launch};
