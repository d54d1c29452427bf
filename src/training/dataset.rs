use crate::domain::entities::{Label, Utterance};
use crate::domain::errors::AppError;
use crate::infrastructure::augmentation::Augmenter;
use crate::preprocessing::sampler::crop_linspace;
use crate::preprocessing::stream::{SegmentSource, StreamSampler, WavFileSource};
use crate::preprocessing::wav::{load_wav, to_mono};
use rand::Rng;
use std::fs;
use std::path::Path;
use tch::{Device, Tensor};

/// Parses an ASVspoof-style protocol file: one utterance per line,
/// `speaker utt_id - attack key` with key `bonafide` or `spoof`.
pub fn parse_protocol(protocol: &Path, audio_dir: &Path) -> Result<Vec<Utterance>, AppError> {
    let raw = fs::read_to_string(protocol)?;
    let mut utterances = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(AppError::Protocol(format!(
                "{}:{}: expected at least 3 fields, got {}",
                protocol.display(),
                lineno + 1,
                fields.len()
            )));
        }
        let label = match fields[fields.len() - 1] {
            "bonafide" => Label::Bonafide,
            "spoof" => Label::Spoof,
            other => {
                return Err(AppError::Protocol(format!(
                    "{}:{}: unknown key '{}'",
                    protocol.display(),
                    lineno + 1,
                    other
                )));
            }
        };
        utterances.push(Utterance {
            path: audio_dir.join(format!("{}.wav", fields[1])),
            speaker: fields[0].to_string(),
            attack: fields[fields.len() - 2].to_string(),
            label,
        });
    }
    Ok(utterances)
}

pub struct TrainSet {
    pub bonafide: Vec<Utterance>,
    pub spoof: Vec<Utterance>,
}

impl TrainSet {
    pub fn from_protocol(protocol: &Path, audio_dir: &Path) -> Result<Self, AppError> {
        let mut bonafide = Vec::new();
        let mut spoof = Vec::new();
        for utterance in parse_protocol(protocol, audio_dir)? {
            match utterance.label {
                Label::Bonafide => bonafide.push(utterance),
                Label::Spoof => spoof.push(utterance),
            }
        }
        if bonafide.is_empty() || spoof.is_empty() {
            return Err(AppError::Protocol(
                "training protocol must contain both bonafide and spoof utterances".into(),
            ));
        }
        Ok(TrainSet { bonafide, spoof })
    }
}

/// Pairs every index of the larger domain with one of the smaller, cycling
/// the smaller domain so both sides are present in every step of an epoch.
/// Returns `(bonafide_index, spoof_index)` pairs.
pub fn balanced_pairs(bona_order: &[usize], spoof_order: &[usize]) -> Vec<(usize, usize)> {
    if bona_order.is_empty() || spoof_order.is_empty() {
        return Vec::new();
    }
    if bona_order.len() >= spoof_order.len() {
        bona_order
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, spoof_order[i % spoof_order.len()]))
            .collect()
    } else {
        spoof_order
            .iter()
            .enumerate()
            .map(|(i, &s)| (bona_order[i % bona_order.len()], s))
            .collect()
    }
}

/// A combined training batch, bonafide half first.
pub struct Batch {
    pub long: Tensor,
    pub short: Tensor,
    pub labels: Tensor,
    pub bona_size: i64,
}

pub struct BatchLoader {
    sampler: StreamSampler,
    augmenter: Option<Augmenter>,
    crop_size: usize,
    crop_size_short: usize,
    sample_rate: u32,
    device: Device,
}

impl BatchLoader {
    pub fn new(
        sampler: StreamSampler,
        augmenter: Option<Augmenter>,
        crop_size: usize,
        crop_size_short: usize,
        sample_rate: u32,
        device: Device,
    ) -> Self {
        BatchLoader {
            sampler,
            augmenter,
            crop_size,
            crop_size_short,
            sample_rate,
            device,
        }
    }

    /// Streams two random crops per utterance and stacks the bonafide and
    /// spoof halves, bonafide first, into `[B, T]` tensors.
    pub fn load_batch<R: Rng>(
        &self,
        bonafide: &[&Utterance],
        spoof: &[&Utterance],
        rng: &mut R,
    ) -> Result<Batch, AppError> {
        let total = bonafide.len() + spoof.len();
        let mut long = Vec::with_capacity(total);
        let mut short = Vec::with_capacity(total);
        let mut labels = Vec::with_capacity(total);
        for utterance in bonafide.iter().chain(spoof.iter()) {
            let (l, s) = self.load_crops(utterance, rng)?;
            long.push(l);
            short.push(s);
            labels.push(utterance.label.class_index());
        }
        Ok(Batch {
            long: Tensor::stack(&long, 0).to_device(self.device),
            short: Tensor::stack(&short, 0).to_device(self.device),
            labels: Tensor::from_slice(&labels).to_device(self.device),
            bona_size: bonafide.len() as i64,
        })
    }

    fn load_crops<R: Rng>(
        &self,
        utterance: &Utterance,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor), AppError> {
        let mut source = WavFileSource::open(&utterance.path)?;
        if source.sample_rate() != self.sample_rate {
            return Err(AppError::SampleRateMismatch {
                path: utterance.path.clone(),
                expected: self.sample_rate,
                actual: source.sample_rate(),
            });
        }
        let long = self.crop_tensor(&mut source, self.crop_size, rng)?;
        let short = self.crop_tensor(&mut source, self.crop_size_short, rng)?;
        Ok((long, short))
    }

    fn crop_tensor<R: Rng>(
        &self,
        source: &mut WavFileSource,
        size: usize,
        rng: &mut R,
    ) -> Result<Tensor, AppError> {
        let crop = self.sampler.crop_random(source, size, false, rng)?;
        let mono = to_mono(&crop.segment)?;
        let mono = match &self.augmenter {
            Some(augmenter) => augmenter.apply_random(mono, rng),
            None => mono,
        };
        Ok(Tensor::from_slice(&mono.to_vec()))
    }
}

/// Loads an evaluation utterance as a `[num_segments, seg_size]` tensor of
/// evenly spaced crops.
pub fn load_eval_segments(
    utterance: &Utterance,
    num_segments: usize,
    seg_size: usize,
    expected_rate: u32,
) -> Result<Tensor, AppError> {
    let (wav, rate) = load_wav(&utterance.path)?;
    if rate != expected_rate {
        return Err(AppError::SampleRateMismatch {
            path: utterance.path.clone(),
            expected: expected_rate,
            actual: rate,
        });
    }
    let crop = crop_linspace(&wav, num_segments, seg_size, false)?;
    let mut rows = Vec::with_capacity(crop.segments.len());
    for segment in &crop.segments {
        let mono = to_mono(segment)?;
        rows.push(Tensor::from_slice(&mono.to_vec()));
    }
    Ok(Tensor::stack(&rows, 0))
}
