use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("unsupported waveform rank {0}, expected 1 (mono) or 2 (frames x channels)")]
    UnsupportedRank(usize),
    #[error("empty crop range: {0}")]
    EmptyRange(String),
    #[error("source unreadable after {attempts} attempts: {path}")]
    SourceUnreadable { path: PathBuf, attempts: u32 },
    #[error("waveform shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("sampling error: {0}")]
    Sample(#[from] SampleError),
    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("progress template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("metric error: {0}")]
    Metric(String),
    #[error("{path}: sample rate {actual} does not match configured {expected}")]
    SampleRateMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
}
