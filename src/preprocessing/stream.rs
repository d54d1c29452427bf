use crate::domain::entities::CropResult;
use crate::domain::errors::{AppError, SampleError};
use crate::infrastructure::error_log::FailureLog;
use crate::preprocessing::sampler::pad_wrap;
use hound::SampleFormat;
use ndarray::{Array1, Array2, ArrayD, Axis, Slice};
use rand::Rng;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Guard against duration metadata overshooting the real frame count.
const DURATION_EPSILON_SECS: f64 = 0.001;

/// A lazily readable audio source: reports its length from metadata and
/// serves frame ranges without decoding the whole file.
pub trait SegmentSource {
    /// Conservative frame count derived from duration metadata; may
    /// underestimate, never overshoots.
    fn frame_count(&mut self) -> Result<usize, AppError>;
    fn sample_rate(&self) -> u32;
    fn read_frames(&mut self, start: usize, count: usize) -> Result<ArrayD<f32>, AppError>;
    fn read_all(&mut self) -> Result<ArrayD<f32>, AppError>;
    fn descriptor(&self) -> &Path;
}

pub struct WavFileSource {
    path: PathBuf,
    reader: hound::WavReader<BufReader<File>>,
}

impl WavFileSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let reader = hound::WavReader::open(&path)?;
        Ok(WavFileSource { path, reader })
    }
}

impl SegmentSource for WavFileSource {
    fn frame_count(&mut self) -> Result<usize, AppError> {
        let rate = self.reader.spec().sample_rate as f64;
        let duration_secs = self.reader.duration() as f64 / rate;
        Ok(((duration_secs - DURATION_EPSILON_SECS) * rate).max(0.0) as usize)
    }

    fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    fn read_frames(&mut self, start: usize, count: usize) -> Result<ArrayD<f32>, AppError> {
        let spec = self.reader.spec();
        let channels = spec.channels as usize;
        self.reader.seek(start as u32)?;
        let wanted = count * channels;
        let samples = match spec.sample_format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(wanted)
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                self.reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        if samples.len() < wanted {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{}: short read at frame {start}", self.path.display()),
            )));
        }
        if channels == 1 {
            Ok(Array1::from(samples).into_dyn())
        } else {
            Ok(Array2::from_shape_vec((count, channels), samples)
                .map_err(SampleError::from)?
                .into_dyn())
        }
    }

    fn read_all(&mut self) -> Result<ArrayD<f32>, AppError> {
        let frames = self.reader.duration() as usize;
        self.read_frames(0, frames)
    }

    fn descriptor(&self) -> &Path {
        &self.path
    }
}

/// Random cropping over a lazily read source. A failed read at a chosen
/// offset is recorded to the injected failure log and retried with a fresh
/// offset, at most `max_retries` times.
pub struct StreamSampler {
    max_retries: u32,
    failure_log: Option<Arc<dyn FailureLog>>,
}

impl StreamSampler {
    pub fn new(max_retries: u32) -> Self {
        StreamSampler {
            max_retries,
            failure_log: None,
        }
    }

    pub fn with_failure_log(mut self, log: Arc<dyn FailureLog>) -> Self {
        self.failure_log = Some(log);
        self
    }

    pub fn crop_random<R: Rng>(
        &self,
        source: &mut dyn SegmentSource,
        size: usize,
        report_start_time: bool,
        rng: &mut R,
    ) -> Result<CropResult, AppError> {
        if size == 0 {
            return Err(SampleError::EmptyRange("crop size must be positive".into()).into());
        }
        let frames = source.frame_count()?;

        if frames <= size {
            // The metadata estimate is conservative, so decide padding or
            // truncation from the decoded length.
            let wav = source.read_all()?;
            let actual = wav.shape().first().copied().unwrap_or(0);
            if actual == 0 {
                return Err(SampleError::EmptyRange(format!(
                    "{}: no frames to crop",
                    source.descriptor().display()
                ))
                .into());
            }
            let segment = if actual < size {
                pad_wrap(&wav, size)?
            } else {
                wav.slice_axis(Axis(0), Slice::from(0..size as isize))
                    .to_owned()
            };
            return Ok(CropResult {
                segment,
                start_time: report_start_time.then_some(0.0),
            });
        }

        let mut attempts = 0;
        loop {
            let start = rng.random_range(0..=frames - size);
            match source.read_frames(start, size) {
                Ok(segment) => {
                    return Ok(CropResult {
                        segment,
                        start_time: report_start_time
                            .then(|| start as f64 / source.sample_rate() as f64),
                    });
                }
                Err(err) => {
                    attempts += 1;
                    if let Some(log) = &self.failure_log {
                        log.record(source.descriptor(), start);
                    }
                    warn!(
                        path = %source.descriptor().display(),
                        start,
                        attempts,
                        error = %err,
                        "stream read failed, retrying with a fresh offset"
                    );
                    if attempts >= self.max_retries {
                        return Err(SampleError::SourceUnreadable {
                            path: source.descriptor().to_path_buf(),
                            attempts,
                        }
                        .into());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error_log::MemoryFailureLog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn write_ramp_wav(path: &Path, frames: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample(i as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Source over an in-memory ramp that fails a configurable number of
    /// offset reads before recovering.
    struct FlakySource {
        path: PathBuf,
        data: Vec<f32>,
        failures_left: usize,
        failed_reads: usize,
    }

    impl FlakySource {
        fn new(frames: usize, failures: usize) -> Self {
            FlakySource {
                path: PathBuf::from("flaky.wav"),
                data: (0..frames).map(|i| i as f32).collect(),
                failures_left: failures,
                failed_reads: 0,
            }
        }
    }

    impl SegmentSource for FlakySource {
        fn frame_count(&mut self) -> Result<usize, AppError> {
            Ok(self.data.len())
        }

        fn sample_rate(&self) -> u32 {
            16000
        }

        fn read_frames(&mut self, start: usize, count: usize) -> Result<ArrayD<f32>, AppError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                self.failed_reads += 1;
                return Err(AppError::Io(std::io::Error::other("transient failure")));
            }
            Ok(Array1::from(self.data[start..start + count].to_vec()).into_dyn())
        }

        fn read_all(&mut self) -> Result<ArrayD<f32>, AppError> {
            Ok(Array1::from(self.data.clone()).into_dyn())
        }

        fn descriptor(&self) -> &Path {
            &self.path
        }
    }

    #[test]
    fn streamed_crop_matches_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp_wav(&path, 2000, 16000);

        let mut source = WavFileSource::open(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let sampler = StreamSampler::new(3);
        let crop = sampler
            .crop_random(&mut source, 100, true, &mut rng)
            .unwrap();

        assert_eq!(crop.segment.shape(), &[100]);
        let start = (crop.segment[[0]] * 32768.0).round() as usize;
        for i in 0..100 {
            let value = (crop.segment[[i]] * 32768.0).round() as usize;
            assert_eq!(value, start + i);
        }
        assert_eq!(crop.start_time, Some(start as f64 / 16000.0));
    }

    #[test]
    fn frame_count_underestimates_by_the_epsilon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp_wav(&path, 2000, 16000);

        let mut source = WavFileSource::open(&path).unwrap();
        assert_eq!(source.frame_count().unwrap(), 1984);
    }

    #[test]
    fn short_streams_are_wrap_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_ramp_wav(&path, 5, 16000);

        let mut source = WavFileSource::open(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let crop = StreamSampler::new(3)
            .crop_random(&mut source, 8, true, &mut rng)
            .unwrap();

        let expected: Vec<usize> = vec![0, 1, 2, 3, 4, 0, 1, 2];
        let got: Vec<usize> = (0..8)
            .map(|i| (crop.segment[[i]] * 32768.0).round() as usize)
            .collect();
        assert_eq!(got, expected);
        assert_eq!(crop.start_time, Some(0.0));
    }

    #[test]
    fn transient_failures_are_logged_and_retried() {
        let log = Arc::new(MemoryFailureLog::new());
        let mut source = FlakySource::new(1000, 2);
        let mut rng = StdRng::seed_from_u64(9);
        let crop = StreamSampler::new(5)
            .with_failure_log(log.clone())
            .crop_random(&mut source, 10, false, &mut rng)
            .unwrap();

        assert_eq!(crop.segment.shape(), &[10]);
        assert_eq!(source.failed_reads, 2);
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|(p, _)| p == Path::new("flaky.wav")));
    }

    #[test]
    fn persistent_failures_exhaust_the_retry_budget() {
        let log = Arc::new(MemoryFailureLog::new());
        let mut source = FlakySource::new(1000, usize::MAX);
        let mut rng = StdRng::seed_from_u64(9);
        let err = StreamSampler::new(3)
            .with_failure_log(log.clone())
            .crop_random(&mut source, 10, false, &mut rng)
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Sample(SampleError::SourceUnreadable { attempts: 3, .. })
        ));
        assert_eq!(log.records().len(), 3);
    }

    #[test]
    fn zero_size_fails_fast() {
        let mut source = FlakySource::new(1000, 0);
        let mut rng = StdRng::seed_from_u64(9);
        let err = StreamSampler::new(3)
            .crop_random(&mut source, 0, false, &mut rng)
            .unwrap_err();
        assert!(matches!(err, AppError::Sample(SampleError::EmptyRange(_))));
    }
}
