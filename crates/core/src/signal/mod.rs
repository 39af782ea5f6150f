use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{PipelineConfig, Result};

/// Which feature of the audio block drives the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMode {
    /// Per-sample absolute amplitude plus a fixed offset.
    Amplitude,
    /// Magnitude spectrum normalised by its own peak.
    Frequency,
}

/// Converts raw audio blocks into normalised `[0, 1]` intensity sequences.
///
/// All buffers are sized for the configured block when the extractor is
/// built, so [`SignalExtractor::extract`] never allocates.
pub struct SignalExtractor {
    mode: SignalMode,
    block_size: usize,
    amplitude_offset: f32,
    fft: Option<FftResources>,
    intensities: Vec<f32>,
}

impl SignalExtractor {
    pub fn new(mode: SignalMode, block_size: usize, amplitude_offset: f32) -> Self {
        let fft = match mode {
            SignalMode::Frequency => Some(FftResources::new(block_size)),
            SignalMode::Amplitude => None,
        };
        let len = match mode {
            SignalMode::Frequency => block_size / 2 + 1,
            SignalMode::Amplitude => block_size,
        };

        Self {
            mode,
            block_size,
            amplitude_offset,
            fft,
            intensities: vec![0.0; len],
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mode = if config.frequency_mode {
            SignalMode::Frequency
        } else {
            SignalMode::Amplitude
        };
        Self::new(mode, config.block_size, config.amplitude_offset)
    }

    pub fn mode(&self) -> SignalMode {
        self.mode
    }

    /// Number of bins produced per block.
    pub fn output_len(&self) -> usize {
        self.intensities.len()
    }

    /// Derives the intensity sequence for one block.
    ///
    /// A block of the wrong length is treated as silence. Non-finite samples
    /// count as zero.
    pub fn extract(&mut self, block: &[f32]) -> &[f32] {
        if block.len() != self.block_size {
            tracing::trace!(
                got = block.len(),
                expected = self.block_size,
                "malformed audio block, rendering silence"
            );
            self.render_silence();
            return &self.intensities;
        }

        match self.mode {
            SignalMode::Amplitude => {
                let offset = self.amplitude_offset;
                for (out, sample) in self.intensities.iter_mut().zip(block) {
                    *out = (finite_or_zero(*sample).abs() + offset).clamp(0.0, 1.0);
                }
            }
            SignalMode::Frequency => {
                if let Err(err) = self.spectrum(block) {
                    tracing::trace!(%err, "fft failed, rendering silence");
                    self.render_silence();
                }
            }
        }

        &self.intensities
    }

    fn spectrum(&mut self, block: &[f32]) -> Result<()> {
        let Some(fft) = self.fft.as_mut() else {
            return Ok(());
        };

        for (slot, sample) in fft.input.iter_mut().zip(block) {
            *slot = finite_or_zero(*sample);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let mut peak = 0.0_f32;
        for (out, bin) in self.intensities.iter_mut().zip(&fft.spectrum) {
            let magnitude = bin.norm();
            *out = magnitude;
            peak = peak.max(magnitude);
        }

        let scale = if peak > 0.0 { peak } else { 1.0 };
        for value in &mut self.intensities {
            *value /= scale;
        }

        Ok(())
    }

    fn render_silence(&mut self) {
        let floor = match self.mode {
            SignalMode::Amplitude => self.amplitude_offset.clamp(0.0, 1.0),
            SignalMode::Frequency => 0.0,
        };
        self.intensities.fill(floor);
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        Self {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for SignalExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalExtractor")
            .field("mode", &self.mode)
            .field("block_size", &self.block_size)
            .field("amplitude_offset", &self.amplitude_offset)
            .field("bins", &self.intensities.len())
            .finish()
    }
}

fn finite_or_zero(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    #[test]
    fn amplitude_mode_offsets_and_clamps() {
        let mut extractor = SignalExtractor::new(SignalMode::Amplitude, 4, 0.25);
        let out = extractor.extract(&[-0.5, 0.9, 0.0, -1.0]);
        assert_eq!(out, &[0.75, 1.0, 0.25, 1.0]);
    }

    #[test]
    fn negative_offset_floors_at_zero() {
        let mut extractor = SignalExtractor::new(SignalMode::Amplitude, 3, -0.5);
        let out = extractor.extract(&[0.25, -0.75, f32::NAN]);
        assert_eq!(out, &[0.0, 0.25, 0.0]);
    }

    #[test]
    fn silent_block_in_amplitude_mode_is_zero() {
        let mut extractor = SignalExtractor::new(SignalMode::Amplitude, 512, 0.0);
        let out = extractor.extract(&[0.0; 512]);
        assert_eq!(out.len(), 512);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn silent_block_in_frequency_mode_uses_unit_floor() {
        let mut extractor = SignalExtractor::new(SignalMode::Frequency, 256, 0.0);
        let out = extractor.extract(&[0.0; 256]);
        assert_eq!(out.len(), 129);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn pure_tone_normalises_to_single_peak() {
        let block_size = 512;
        let bin = 8;
        let block: Vec<f32> = (0..block_size)
            .map(|n| (2.0 * PI * bin as f32 * n as f32 / block_size as f32).sin())
            .collect();

        let mut extractor = SignalExtractor::new(SignalMode::Frequency, block_size, 0.0);
        let out = extractor.extract(&block);

        assert_eq!(out.len(), block_size / 2 + 1);
        assert_eq!(out[bin], 1.0);
        for (index, value) in out.iter().enumerate() {
            if index != bin {
                assert!(*value < 1e-3, "bin {index} = {value}");
            }
        }
    }

    #[test]
    fn wrong_length_block_is_silence() {
        let mut extractor = SignalExtractor::new(SignalMode::Frequency, 64, 0.0);
        let out = extractor.extract(&[1.0; 10]);
        assert_eq!(out.len(), 33);
        assert!(out.iter().all(|v| *v == 0.0));

        let mut extractor = SignalExtractor::new(SignalMode::Amplitude, 8, 0.0);
        assert!(extractor.extract(&[]).iter().all(|v| *v == 0.0));
    }
}
