use crate::domain::errors::AppError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tch::Device;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub sampling: SamplingConfig,
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    pub train_protocol: PathBuf,
    pub train_audio_dir: PathBuf,
    pub sample_rate: u32,
    pub failure_log: Option<PathBuf>,
    pub eval_sets: Vec<EvalSetConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EvalSetConfig {
    pub name: String,
    pub protocol: PathBuf,
    pub audio_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct SamplingConfig {
    pub crop_size: usize,
    pub crop_size_short: usize,
    pub eval_segments: usize,
    pub eval_segment_size: usize,
    pub max_read_retries: u32,
}

#[derive(Debug, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub lr_decay: f64,
    pub freeze_epochs: usize,
    pub augment_probability: f64,
    pub patience: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    pub device: String,
    pub plm_path: PathBuf,
    pub hidden_size: i64,
    pub embedding_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationConfig {
    pub scores_file: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn device(&self) -> Result<Device, AppError> {
        match self.model.device.as_str() {
            "cuda_if_available" => Ok(Device::cuda_if_available()),
            "cuda:0" => Ok(Device::Cuda(0)),
            "cpu" => Ok(Device::Cpu),
            other => Err(AppError::InvalidConfig(format!(
                "unknown device specification '{other}'"
            ))),
        }
    }
}
