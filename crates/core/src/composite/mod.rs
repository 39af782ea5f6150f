use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    color::{pack_rgb565, unpack_rgb565},
    PipelineConfig, PixelFrame,
};

/// How the interpolated sequence is laid out on screen. Exactly one strategy
/// is active per frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompositeStrategy {
    /// Straight raster order.
    Raw,
    /// Even samples addressed column-major, odd samples row-major.
    Mixed,
    /// Per-channel weighted mix of `Raw` and `Mixed`.
    Blend { ratio: f32, black_and_white: bool },
    /// Samples scattered through a [`RandomMap`].
    Random { reshuffle: bool },
}

impl CompositeStrategy {
    /// Picks the strategy with precedence random, blend, mixed, raw.
    pub fn from_config(config: &PipelineConfig) -> Self {
        if config.random {
            Self::Random {
                reshuffle: config.reshuffle,
            }
        } else if config.blend {
            Self::Blend {
                ratio: config.blend_ratio,
                black_and_white: config.black_and_white,
            }
        } else if config.mixed {
            Self::Mixed
        } else {
            Self::Raw
        }
    }
}

/// Permutation of the pixel indices `[0, len)`.
#[derive(Debug, Clone)]
pub struct RandomMap {
    indices: Vec<usize>,
    rng: StdRng,
}

impl RandomMap {
    pub fn new(len: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut map = Self {
            indices: (0..len).collect(),
            rng,
        };
        map.reshuffle();
        map
    }

    /// Replaces the map with a fresh uniform permutation, in place.
    pub fn reshuffle(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Arranges the interpolated sequence into a [`PixelFrame`].
///
/// Owns the random map and the scratch frame used by blending, so composing
/// never allocates.
#[derive(Debug, Clone)]
pub struct Compositor {
    strategy: CompositeStrategy,
    width: usize,
    height: usize,
    random_map: RandomMap,
    scratch: PixelFrame,
}

impl Compositor {
    pub fn new(strategy: CompositeStrategy, width: usize, height: usize, seed: Option<u64>) -> Self {
        Self {
            strategy,
            width,
            height,
            random_map: RandomMap::new(width * height, seed),
            scratch: PixelFrame::new(width, height),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            CompositeStrategy::from_config(config),
            config.width,
            config.height,
            config.seed,
        )
    }

    pub fn strategy(&self) -> CompositeStrategy {
        self.strategy
    }

    pub fn random_map(&self) -> &RandomMap {
        &self.random_map
    }

    /// Composes one frame from `samples`, which holds at least
    /// `width * height` values.
    pub fn compose(&mut self, samples: &[u16], out: &mut PixelFrame) {
        let samples = &samples[..self.width * self.height];
        match self.strategy {
            CompositeStrategy::Raw => write_raw(samples, out),
            CompositeStrategy::Mixed => write_mixed(samples, out),
            CompositeStrategy::Blend {
                ratio,
                black_and_white,
            } => {
                if ratio <= 0.0 {
                    write_raw(samples, out);
                } else if ratio >= 1.0 {
                    write_mixed(samples, out);
                } else {
                    write_mixed(samples, &mut self.scratch);
                    blend(samples, &self.scratch, ratio, black_and_white, out);
                }
            }
            CompositeStrategy::Random { reshuffle } => {
                if reshuffle {
                    self.random_map.reshuffle();
                }
                for (pixel, source) in out.pixels_mut().iter_mut().zip(self.random_map.indices()) {
                    *pixel = samples[*source];
                }
            }
        }
    }
}

fn write_raw(samples: &[u16], out: &mut PixelFrame) {
    out.pixels_mut().copy_from_slice(samples);
}

fn write_mixed(samples: &[u16], out: &mut PixelFrame) {
    let (width, height) = (out.width(), out.height());
    out.fill(0);
    let pixels = out.pixels_mut();

    for idx in (0..samples.len()).step_by(2) {
        let (x, y) = (idx / height, idx % height);
        pixels[y * width + x] = samples[idx];
    }
    for idx in (1..samples.len()).step_by(2) {
        let (x, y) = (idx % width, idx / width);
        pixels[y * width + x] = samples[idx];
    }
}

fn blend(raw: &[u16], mixed: &PixelFrame, ratio: f32, black_and_white: bool, out: &mut PixelFrame) {
    let coef = (ratio * 256.0) as u32;
    let inverse = ((1.0 - ratio) * 256.0) as u32;

    for ((pixel, raw), mixed) in out.pixels_mut().iter_mut().zip(raw).zip(mixed.pixels()) {
        let (rr, rg, rb) = unpack_rgb565(*raw);
        let (mr, mg, mb) = unpack_rgb565(*mixed);
        let mix = |a: u16, b: u16| ((a as u32 * inverse + b as u32 * coef) >> 8) as u16;
        let blended = pack_rgb565(mix(rr, mr), mix(rg, mg), mix(rb, mb));

        *pixel = if black_and_white {
            let value = blended as u32;
            let gray5 = ((value * 31) / 65_535) as u16;
            let gray6 = ((value * 63) / 65_535) as u16;
            pack_rgb565(gray5, gray6, gray5)
        } else {
            blended
        };
    }
}
