pub mod file_utils;
pub mod log_setup;

pub use file_utils::{files_with_extensions, normalize_separators, TIFF_EXTENSIONS};
pub use log_setup::{setup_logging, LogSetupError};
