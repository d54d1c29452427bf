use crate::domain::entities::{CropResult, LinspaceCrop};
use crate::domain::errors::SampleError;
use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2, Slice};
use rand::Rng;

fn check_rank(wav: &ArrayD<f32>) -> Result<(), SampleError> {
    match wav.ndim() {
        1 | 2 => Ok(()),
        rank => Err(SampleError::UnsupportedRank(rank)),
    }
}

fn slice_frames(wav: &ArrayD<f32>, start: usize, len: usize) -> ArrayD<f32> {
    wav.slice_axis(Axis(0), Slice::from(start as isize..(start + len) as isize))
        .to_owned()
}

/// Extends a waveform to `size` frames by continuing its content cyclically
/// from the start. Mono (`[T]`) and time-major multi-channel (`[T, C]`)
/// input only; anything already `size` frames or longer passes through.
pub fn pad_wrap(wav: &ArrayD<f32>, size: usize) -> Result<ArrayD<f32>, SampleError> {
    check_rank(wav)?;
    let frames = wav.shape()[0];
    if frames == 0 {
        return Err(SampleError::EmptyRange(
            "cannot wrap-pad an empty waveform".into(),
        ));
    }
    if frames >= size {
        return Ok(wav.clone());
    }
    match wav.ndim() {
        1 => {
            let w = wav.view().into_dimensionality::<Ix1>()?;
            Ok(Array1::from_shape_fn(size, |i| w[i % frames]).into_dyn())
        }
        _ => {
            let w = wav.view().into_dimensionality::<Ix2>()?;
            let channels = w.ncols();
            Ok(Array2::from_shape_fn((size, channels), |(i, c)| w[[i % frames, c]]).into_dyn())
        }
    }
}

/// Crops a segment of exactly `size` frames at a uniformly random offset.
/// Short input is wrap-padded, input of exactly `size` frames is returned
/// whole; in both cases the start offset is 0.
pub fn crop_random<R: Rng>(
    wav: &ArrayD<f32>,
    size: usize,
    sample_rate: u32,
    report_start_time: bool,
    rng: &mut R,
) -> Result<CropResult, SampleError> {
    check_rank(wav)?;
    if size == 0 {
        return Err(SampleError::EmptyRange("crop size must be positive".into()));
    }
    let frames = wav.shape()[0];
    if frames == 0 {
        return Err(SampleError::EmptyRange(
            "cannot crop an empty waveform".into(),
        ));
    }

    let (segment, start) = if frames <= size {
        let segment = if frames < size {
            pad_wrap(wav, size)?
        } else {
            wav.clone()
        };
        (segment, 0)
    } else {
        let start = rng.random_range(0..=frames - size);
        (slice_frames(wav, start, size), start)
    };

    Ok(CropResult {
        segment,
        start_time: report_start_time.then(|| start as f64 / sample_rate as f64),
    })
}

/// Deterministic multi-segment sampling: `num_segments` windows of
/// `seg_size` frames whose start offsets are evenly spaced, both ends
/// inclusive, across the waveform. Offsets are truncated to integers and
/// duplicates are preserved.
pub fn crop_linspace(
    wav: &ArrayD<f32>,
    num_segments: usize,
    seg_size: usize,
    include_original: bool,
) -> Result<LinspaceCrop, SampleError> {
    check_rank(wav)?;
    if num_segments == 0 {
        return Err(SampleError::EmptyRange(
            "segment count must be positive".into(),
        ));
    }
    if seg_size == 0 {
        return Err(SampleError::EmptyRange(
            "segment size must be positive".into(),
        ));
    }
    if wav.shape()[0] == 0 {
        return Err(SampleError::EmptyRange(
            "cannot crop an empty waveform".into(),
        ));
    }

    let padded;
    let wav = if wav.shape()[0] < seg_size {
        padded = pad_wrap(wav, seg_size)?;
        &padded
    } else {
        wav
    };
    let frames = wav.shape()[0];

    let span = (frames - seg_size) as f64;
    let segments = (0..num_segments)
        .map(|i| {
            let offset = if num_segments == 1 {
                0
            } else {
                (span * i as f64 / (num_segments - 1) as f64) as usize
            };
            slice_frames(wav, offset, seg_size)
        })
        .collect();

    Ok(LinspaceCrop {
        segments,
        original: include_original.then(|| wav.clone()),
    })
}
