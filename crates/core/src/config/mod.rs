use serde::{Deserialize, Serialize};

use crate::{FbVizError, Result};

/// Fully merged settings consumed by the rendering pipeline.
///
/// Ratio and offset are clamped once, when the configuration is produced,
/// and are never re-clamped while frames are being rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub blend_ratio: f32,
    pub amplitude_offset: f32,
    pub frequency_mode: bool,
    pub blend: bool,
    pub mixed: bool,
    pub random: bool,
    pub reshuffle: bool,
    pub partial_update: bool,
    pub black_and_white: bool,
    pub block_size: usize,
    pub width: usize,
    pub height: usize,
    /// Seed for the random pixel map. `None` draws one from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Emit the once-per-second FPS and stage timing line.
    #[serde(default)]
    pub diagnostics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blend_ratio: 0.5,
            amplitude_offset: 0.0,
            frequency_mode: false,
            blend: false,
            mixed: false,
            random: false,
            reshuffle: false,
            partial_update: false,
            black_and_white: false,
            block_size: 512,
            width: 0,
            height: 0,
            seed: None,
            diagnostics: false,
        }
    }
}

impl PipelineConfig {
    /// Default settings for a screen of the given size.
    pub fn for_screen(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Clamps the blend ratio to `[0, 1]` and the amplitude offset to `[-1, 1]`.
    /// NaN inputs fall back to the defaults.
    pub fn clamped(mut self) -> Self {
        self.blend_ratio = if self.blend_ratio.is_nan() {
            0.5
        } else {
            self.blend_ratio.clamp(0.0, 1.0)
        };
        self.amplitude_offset = if self.amplitude_offset.is_nan() {
            0.0
        } else {
            self.amplitude_offset.clamp(-1.0, 1.0)
        };
        self
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FbVizError::config(format!(
                "target frame size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.block_size == 0 {
            return Err(FbVizError::config("audio block size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.blend_ratio) {
            return Err(FbVizError::config(format!(
                "blend ratio {} outside [0, 1]",
                self.blend_ratio
            )));
        }
        if !(-1.0..=1.0).contains(&self.amplitude_offset) {
            return Err(FbVizError::config(format!(
                "amplitude offset {} outside [-1, 1]",
                self.amplitude_offset
            )));
        }
        Ok(())
    }

    /// Number of pixels in one frame.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Length of the intensity sequence produced for one block.
    pub fn signal_len(&self) -> usize {
        if self.frequency_mode {
            self.block_size / 2 + 1
        } else {
            self.block_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_ratio_and_offset() {
        let config = PipelineConfig {
            blend_ratio: 3.0,
            amplitude_offset: -7.5,
            ..PipelineConfig::for_screen(4, 4)
        }
        .clamped();

        assert_eq!(config.blend_ratio, 1.0);
        assert_eq!(config.amplitude_offset, -1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_geometry() {
        let err = PipelineConfig::for_screen(0, 480).validate().unwrap_err();
        assert!(matches!(err, FbVizError::Config(_)));
        assert!(format!("{err}").contains("0x480"));
    }

    #[test]
    fn rejects_unclamped_ratio() {
        let config = PipelineConfig {
            blend_ratio: 1.5,
            ..PipelineConfig::for_screen(2, 2)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn signal_len_follows_mode() {
        let mut config = PipelineConfig::for_screen(4, 4);
        assert_eq!(config.signal_len(), 512);
        config.frequency_mode = true;
        assert_eq!(config.signal_len(), 257);
    }
}
