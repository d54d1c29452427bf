use crate::domain::errors::{AppError, SampleError};
use hound::SampleFormat;
use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2};
use std::io::Read;
use std::path::Path;

/// Reads a whole WAV file into a rank-1 (mono) or rank-2 (`[T, C]`)
/// waveform of `f32` samples normalized to [-1.0, 1.0].
pub fn load_wav(path: &Path) -> Result<(ArrayD<f32>, u32), AppError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let mut samples = decode_samples(reader)?;
    let frames = samples.len() / channels;
    samples.truncate(frames * channels);
    let wav = if channels == 1 {
        Array1::from(samples).into_dyn()
    } else {
        Array2::from_shape_vec((frames, channels), samples)
            .map_err(SampleError::from)?
            .into_dyn()
    };
    Ok((wav, spec.sample_rate))
}

fn decode_samples<R: Read>(reader: hound::WavReader<R>) -> Result<Vec<f32>, AppError> {
    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from),
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(AppError::from)
        }
    }
}

/// Downmixes to mono by averaging channels; mono input passes through.
pub fn to_mono(wav: &ArrayD<f32>) -> Result<Array1<f32>, SampleError> {
    match wav.ndim() {
        1 => Ok(wav.view().into_dimensionality::<Ix1>()?.to_owned()),
        2 => {
            let w = wav.view().into_dimensionality::<Ix2>()?;
            w.mean_axis(Axis(1)).ok_or_else(|| {
                SampleError::EmptyRange("cannot downmix a waveform with no channels".into())
            })
        }
        rank => Err(SampleError::UnsupportedRank(rank)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn write_mono_i16(path: &Path, samples: &[i16], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn write_stereo_f32(path: &Path, frames: &[[f32; 2]], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            writer.write_sample(frame[0]).unwrap();
            writer.write_sample(frame[1]).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn load_wav_normalizes_int_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_mono_i16(&path, &[0, 16384, -16384, 32767], 16000);

        let (wav, rate) = load_wav(&path).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(wav.ndim(), 1);
        assert_eq!(wav.shape(), &[4]);
        assert_eq!(wav[[0]], 0.0);
        assert_eq!(wav[[1]], 0.5);
        assert_eq!(wav[[2]], -0.5);
    }

    #[test]
    fn load_wav_keeps_channel_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_f32(&path, &[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]], 44100);

        let (wav, rate) = load_wav(&path).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(wav.shape(), &[3, 2]);
        assert_eq!(wav[[1, 0]], 0.3);
        assert_eq!(wav[[2, 1]], 0.6);
    }

    #[test]
    fn to_mono_averages_channels() {
        let wav = arr2(&[[0.2, 0.4], [1.0, 0.0]]).into_dyn();
        let mono = to_mono(&wav).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn load_wav_fails_on_missing_file() {
        assert!(load_wav(Path::new("does/not/exist.wav")).is_err());
    }
}
