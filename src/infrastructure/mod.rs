pub mod augmentation;
pub mod error_log;
