use ndarray::Array1;
use num_complex::Complex;
use rand::{Rng, RngCore};
use rustfft::FftPlanner;

/// A length-preserving distortion applied to a mono training crop.
pub trait Augmentation: Send + Sync {
    fn apply(&self, wav: &Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32>;
    fn name(&self) -> &'static str;
}

pub struct Augmenter {
    probability: f64,
    augmentations: Vec<Box<dyn Augmentation>>,
}

impl Augmenter {
    pub fn new(probability: f64) -> Self {
        let augmentations: Vec<Box<dyn Augmentation>> = vec![
            Box::new(AdditiveNoise { level: 0.004 }),
            Box::new(GainScale {
                low_db: -6.0,
                high_db: 6.0,
            }),
            Box::new(CircularShift { max_frames: 8000 }),
            Box::new(SpectralNotch {
                max_width_bins: 64,
            }),
        ];
        Augmenter {
            probability: probability.clamp(0.0, 1.0),
            augmentations,
        }
    }

    /// Applies one randomly chosen augmentation with the configured
    /// probability, otherwise returns the crop untouched.
    pub fn apply_random(&self, wav: Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32> {
        if self.augmentations.is_empty() || !rng.random_bool(self.probability) {
            return wav;
        }
        let pick = rng.random_range(0..self.augmentations.len());
        self.augmentations[pick].apply(&wav, rng)
    }
}

struct AdditiveNoise {
    level: f32,
}

impl Augmentation for AdditiveNoise {
    fn apply(&self, wav: &Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32> {
        wav.mapv(|s| s + rng.random_range(-self.level..self.level))
    }

    fn name(&self) -> &'static str {
        "noise"
    }
}

struct GainScale {
    low_db: f32,
    high_db: f32,
}

impl Augmentation for GainScale {
    fn apply(&self, wav: &Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32> {
        let db = rng.random_range(self.low_db..self.high_db);
        let factor = 10.0_f32.powf(db / 20.0);
        wav.mapv(|s| s * factor)
    }

    fn name(&self) -> &'static str {
        "gain"
    }
}

struct CircularShift {
    max_frames: usize,
}

impl Augmentation for CircularShift {
    fn apply(&self, wav: &Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32> {
        let bound = self.max_frames.min(wav.len());
        if bound == 0 {
            return wav.clone();
        }
        let shift = rng.random_range(0..bound);
        let mut out = wav.to_vec();
        out.rotate_right(shift);
        Array1::from(out)
    }

    fn name(&self) -> &'static str {
        "shift"
    }
}

/// Zeroes a random frequency band, mirrored into the conjugate half so the
/// inverse transform stays real.
struct SpectralNotch {
    max_width_bins: usize,
}

impl Augmentation for SpectralNotch {
    fn apply(&self, wav: &Array1<f32>, rng: &mut dyn RngCore) -> Array1<f32> {
        let n = wav.len();
        if n < 8 {
            return wav.clone();
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let mut buffer: Vec<Complex<f32>> = wav.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut buffer);

        let half = n / 2;
        let max_width = self.max_width_bins.clamp(1, half / 2);
        let width = rng.random_range(1..=max_width);
        let lo = rng.random_range(1..half - width);
        for i in lo..lo + width {
            buffer[i] = Complex::new(0.0, 0.0);
            buffer[n - i] = Complex::new(0.0, 0.0);
        }

        ifft.process(&mut buffer);
        Array1::from_iter(buffer.into_iter().map(|c| c.re / n as f32))
    }

    fn name(&self) -> &'static str {
        "notch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(n: usize) -> Array1<f32> {
        Array1::from_iter((0..n).map(|i| (i as f32 * 0.31).sin() * 0.5))
    }

    #[test]
    fn all_augmentations_preserve_length() {
        let mut rng = StdRng::seed_from_u64(17);
        let wav = ramp(1600);
        let augmentations: Vec<Box<dyn Augmentation>> = vec![
            Box::new(AdditiveNoise { level: 0.004 }),
            Box::new(GainScale {
                low_db: -6.0,
                high_db: 6.0,
            }),
            Box::new(CircularShift { max_frames: 400 }),
            Box::new(SpectralNotch { max_width_bins: 16 }),
        ];
        for aug in &augmentations {
            assert_eq!(aug.apply(&wav, &mut rng).len(), 1600, "{}", aug.name());
        }
    }

    #[test]
    fn gain_scales_every_sample_by_one_factor() {
        let mut rng = StdRng::seed_from_u64(17);
        let wav = ramp(64);
        let scaled = GainScale {
            low_db: -6.0,
            high_db: 6.0,
        }
        .apply(&wav, &mut rng);
        let factor = scaled[1] / wav[1];
        for i in 0..64 {
            assert_relative_eq!(scaled[i], wav[i] * factor, epsilon = 1e-5);
        }
    }

    #[test]
    fn notch_round_trips_outside_the_band() {
        let mut rng = StdRng::seed_from_u64(17);
        let wav = ramp(512);
        let notched = SpectralNotch { max_width_bins: 4 }.apply(&wav, &mut rng);
        // Most of the energy survives a narrow notch.
        let energy: f32 = wav.iter().map(|s| s * s).sum();
        let notched_energy: f32 = notched.iter().map(|s| s * s).sum();
        assert!(notched_energy > energy * 0.5);
    }

    #[test]
    fn zero_probability_passes_crops_through() {
        let mut rng = StdRng::seed_from_u64(17);
        let wav = ramp(256);
        let out = Augmenter::new(0.0).apply_random(wav.clone(), &mut rng);
        assert_eq!(out, wav);
    }

    #[test]
    fn full_probability_keeps_length() {
        let mut rng = StdRng::seed_from_u64(17);
        let augmenter = Augmenter::new(1.0);
        for _ in 0..16 {
            let out = augmenter.apply_random(ramp(512), &mut rng);
            assert_eq!(out.len(), 512);
        }
    }
}
