// Declare the modules to re-export
pub mod configs;
pub mod export;
pub mod retrieve;
pub mod statistics;
pub mod storage;
pub mod utils;

// Re-export the most commonly used entry points
pub use configs::config_app::{AppConfig, ConfigError};
pub use statistics::camcom::extractor::{ExtractError, ExtractionReport, Extractor};
pub use utils::misc::sys_info::{get_process_info, ProcessInfo, ProcessInfoError};
