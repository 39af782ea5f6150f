//! Core library for fbviz, a live audio visualiser that draws straight onto a
//! Linux framebuffer.
//!
//! One audio block becomes one frame: the [`SignalExtractor`] turns samples
//! into intensities, the [`ColorMapper`] colours them, the [`Interpolator`]
//! stretches them to one sample per pixel, the [`Compositor`] lays them out
//! and the [`FrameCommitter`] writes the result to a [`FrameSurface`]. The
//! [`Pipeline`] sequences these stages from inside the audio callback.

pub mod audio;
pub mod color;
pub mod commit;
pub mod composite;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod interp;
pub mod pipeline;
pub mod signal;
pub mod surface;

pub use audio::BlockAssembler;
pub use color::{pack_rgb565, unpack_rgb565, ColorMapper, HueLut};
pub use commit::{CommitMode, CommitOutcome, FrameCommitter};
pub use composite::{CompositeStrategy, Compositor, RandomMap};
pub use config::PipelineConfig;
pub use diagnostics::{FpsReport, FrameStats, StageTimings};
pub use error::{FbVizError, Result};
pub use frame::{PixelFrame, Rect};
pub use interp::Interpolator;
pub use pipeline::{FrameReport, Pipeline, PipelineState};
pub use signal::{SignalExtractor, SignalMode};
pub use surface::{FrameSurface, FramebufferGeometry, FramebufferSurface, MemorySurface};
