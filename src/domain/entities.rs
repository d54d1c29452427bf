use ndarray::ArrayD;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Bonafide,
    Spoof,
}

impl Label {
    pub fn class_index(&self) -> i64 {
        match self {
            Label::Bonafide => 1,
            Label::Spoof => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Utterance {
    pub path: PathBuf,
    pub speaker: String,
    pub attack: String,
    pub label: Label,
}

/// A fixed-length segment plus, when requested, its start time in seconds.
#[derive(Debug)]
pub struct CropResult {
    pub segment: ArrayD<f32>,
    pub start_time: Option<f64>,
}

/// Evenly spaced segments plus, when requested, the (possibly padded)
/// waveform they were cut from.
#[derive(Debug)]
pub struct LinspaceCrop {
    pub segments: Vec<ArrayD<f32>>,
    pub original: Option<ArrayD<f32>>,
}
