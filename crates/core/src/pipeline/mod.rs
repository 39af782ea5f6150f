use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

use crate::{
    CommitMode, CommitOutcome, ColorMapper, Compositor, FbVizError, FrameCommitter, FrameStats,
    FrameSurface, Interpolator, PipelineConfig, PixelFrame, Result, SignalExtractor, StageTimings,
};

/// Lifecycle of the pipeline driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, waiting for the audio stream.
    Idle,
    /// Rendering one frame per audio block.
    Running,
    /// Shut down or faulted. Terminal.
    Stopped,
}

/// Result of rendering one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub outcome: CommitOutcome,
    pub timings: StageTimings,
}

/// Audio-callback entry point: turns each block into a frame on `S`.
///
/// Every buffer is sized when the pipeline is built; rendering a block does
/// not allocate. The pipeline is the single owner of the surface, the random
/// map and the previous-frame snapshot, so it can be moved into the audio
/// callback without locks.
pub struct Pipeline<S: FrameSurface> {
    config: PipelineConfig,
    state: PipelineState,
    extractor: SignalExtractor,
    mapper: ColorMapper,
    colors: Vec<u16>,
    interpolator: Interpolator,
    compositor: Compositor,
    frame: PixelFrame,
    committer: FrameCommitter,
    surface: S,
    stats: FrameStats,
}

impl<S: FrameSurface> Pipeline<S> {
    pub fn new(config: PipelineConfig, surface: S) -> Result<Self> {
        config.validate()?;
        if surface.width() != config.width || surface.height() != config.height {
            return Err(FbVizError::config(format!(
                "surface is {}x{} but frames are {}x{}",
                surface.width(),
                surface.height(),
                config.width,
                config.height
            )));
        }

        let extractor = SignalExtractor::from_config(&config);
        let signal_len = extractor.output_len();
        let pixels = config.pixel_count();
        let mode = if config.partial_update {
            CommitMode::Partial
        } else {
            CommitMode::Full
        };

        let pipeline = Self {
            state: PipelineState::Idle,
            mapper: ColorMapper::new(config.black_and_white),
            colors: vec![0; signal_len],
            interpolator: Interpolator::new(signal_len, pixels),
            compositor: Compositor::from_config(&config),
            frame: PixelFrame::new(config.width, config.height),
            committer: FrameCommitter::new(mode, config.width, config.height),
            stats: FrameStats::per_second(),
            extractor,
            surface,
            config,
        };

        tracing::info!(
            width = pipeline.config.width,
            height = pipeline.config.height,
            block_size = pipeline.config.block_size,
            signal = ?pipeline.extractor.mode(),
            strategy = ?pipeline.compositor.strategy(),
            commit = ?pipeline.committer.mode(),
            "pipeline ready"
        );

        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The most recently composed frame.
    pub fn frame(&self) -> &PixelFrame {
        &self.frame
    }

    /// Moves from `Idle` to `Running` and blanks the surface. `sample_rate`
    /// sets the per-block time budget used for overrun diagnostics.
    pub fn start(&mut self, sample_rate: u32) -> Result<()> {
        match self.state {
            PipelineState::Running => return Ok(()),
            PipelineState::Stopped => {
                return Err(FbVizError::msg("pipeline has already stopped"));
            }
            PipelineState::Idle => {}
        }

        if let Err(err) = self.surface.clear() {
            self.fault(&err);
            return Err(err);
        }

        self.stats.set_budget(self.config.block_size, sample_rate);
        self.stats.reset(Instant::now());
        self.state = PipelineState::Running;
        tracing::info!(
            sample_rate,
            budget_ms = self.stats.budget().map(|b| b.as_secs_f64() * 1e3),
            "pipeline running"
        );
        Ok(())
    }

    /// Renders one audio block. Blocks arriving while not running are
    /// ignored. A surface fault stops the pipeline and is returned.
    pub fn process_block(&mut self, block: &[f32]) -> Result<Option<FrameReport>> {
        if self.state != PipelineState::Running {
            return Ok(None);
        }

        let t0 = Instant::now();
        let intensities = self.extractor.extract(block);
        let t1 = Instant::now();
        self.mapper.map_into(intensities, &mut self.colors);
        let t2 = Instant::now();
        let samples = self.interpolator.resample(&self.colors);
        let t3 = Instant::now();
        self.compositor.compose(samples, &mut self.frame);
        let t4 = Instant::now();

        let outcome = match self.committer.commit(&self.frame, &mut self.surface) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fault(&err);
                return Err(err);
            }
        };
        let t5 = Instant::now();

        let timings = StageTimings {
            extract: t1 - t0,
            map: t2 - t1,
            interpolate: t3 - t2,
            composite: t4 - t3,
            commit: t5 - t4,
        };
        if let Some(report) = self.stats.record(timings, t5) {
            if self.config.diagnostics {
                report.log();
            }
            if report.overruns > 0 {
                tracing::warn!(
                    overruns = report.overruns,
                    "frames exceeded the audio block period"
                );
            }
        }

        Ok(Some(FrameReport { outcome, timings }))
    }

    /// [`process_block`](Self::process_block) with panics contained: a panic
    /// in any stage takes the fault path like a surface error. Dropped frames
    /// are logged and rendering continues. Returns the state afterwards.
    pub fn process_block_isolated(&mut self, block: &[f32]) -> PipelineState {
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.process_block(block)));
        match rendered {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.is_fatal() => tracing::error!(%err, "pipeline faulted"),
            Ok(Err(err)) => tracing::warn!(%err, "frame dropped"),
            Err(payload) => self.fault(&panic_message(payload.as_ref())),
        }
        self.state
    }

    /// Stops rendering and releases the surface without touching its contents.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.state = PipelineState::Stopped;
        self.surface.release();
        tracing::info!("pipeline stopped");
    }

    /// Last-resort fault handling: blank the display, release the mapping and
    /// stop, so no stale image stays latched on screen.
    pub fn fault(&mut self, reason: &dyn fmt::Display) {
        tracing::error!(%reason, "pipeline fault, blanking display");
        if !self.surface.is_released() {
            if let Err(err) = self.surface.clear() {
                tracing::warn!(%err, "could not blank display");
            }
        }
        self.surface.release();
        self.state = PipelineState::Stopped;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic while rendering: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic while rendering: {message}")
    } else {
        "panic while rendering".to_string()
    }
}

impl<S: FrameSurface + fmt::Debug> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("surface", &self.surface)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::{MemorySurface, Rect};

    /// Memory surface whose frame writes can be made to fail.
    #[derive(Debug)]
    struct FlakySurface {
        inner: MemorySurface,
        fail_writes: bool,
        panic_writes: bool,
    }

    impl FrameSurface for FlakySurface {
        fn width(&self) -> usize {
            self.inner.width()
        }

        fn height(&self) -> usize {
            self.inner.height()
        }

        fn pixels_mut(&mut self) -> Result<&mut [u16]> {
            self.inner.pixels_mut()
        }

        fn release(&mut self) {
            self.inner.release();
        }

        fn is_released(&self) -> bool {
            self.inner.is_released()
        }

        fn write_frame(&mut self, _frame: &PixelFrame) -> Result<()> {
            if self.panic_writes {
                panic!("mapping vanished");
            }
            if self.fail_writes {
                return Err(FbVizError::surface("device went away"));
            }
            self.inner.pixels_mut()?.fill(0xFFFF);
            Ok(())
        }
    }

    fn flaky(width: usize, height: usize) -> Pipeline<FlakySurface> {
        let surface = FlakySurface {
            inner: MemorySurface::new(width, height),
            fail_writes: false,
            panic_writes: false,
        };
        let mut pipeline = Pipeline::new(config(width, height), surface).unwrap();
        pipeline.start(48_000).unwrap();
        pipeline
    }

    fn config(width: usize, height: usize) -> PipelineConfig {
        PipelineConfig {
            seed: Some(1),
            ..PipelineConfig::for_screen(width, height)
        }
    }

    fn running(config: PipelineConfig) -> Pipeline<MemorySurface> {
        let surface = MemorySurface::new(config.width, config.height);
        let mut pipeline = Pipeline::new(config, surface).unwrap();
        pipeline.start(48_000).unwrap();
        pipeline
    }

    fn sine(block_size: usize, bin: usize) -> Vec<f32> {
        (0..block_size)
            .map(|n| (2.0 * PI * bin as f32 * n as f32 / block_size as f32).sin())
            .collect()
    }

    #[test]
    fn silent_block_renders_black_frame() {
        let mut pipeline = running(config(4, 4));
        pipeline.surface_mut().pixels_mut().unwrap().fill(0x7777);

        let report = pipeline.process_block(&[0.0; 512]).unwrap().unwrap();

        assert_eq!(report.outcome, CommitOutcome::Full);
        assert_eq!(pipeline.surface().pixels(), &[0u16; 16]);
        assert_eq!(pipeline.frame().pixels(), &[0u16; 16]);
    }

    #[test]
    fn loud_block_lights_the_screen() {
        let mut pipeline = running(config(4, 4));
        pipeline.process_block(&[1.0; 512]).unwrap();
        assert_eq!(pipeline.surface().get(0, 0), 0xF800);
        assert!(pipeline.surface().pixels().iter().all(|p| *p != 0));
    }

    #[test]
    fn frequency_mode_shows_tone_peak() {
        let config = PipelineConfig {
            frequency_mode: true,
            ..config(16, 16)
        };
        let mut pipeline = running(config);
        pipeline.process_block(&sine(512, 8)).unwrap();

        let surface = pipeline.surface();
        assert_eq!(surface.get(0, 0), 0);
        assert_ne!(surface.get(8, 0), 0);
        assert_eq!(surface.get(15, 15), 0);
    }

    #[test]
    fn partial_mode_skips_unchanged_frames() {
        let config = PipelineConfig {
            partial_update: true,
            ..config(8, 4)
        };
        let mut pipeline = running(config);

        let loud = pipeline.process_block(&[0.5; 512]).unwrap().unwrap();
        assert_eq!(loud.outcome, CommitOutcome::Partial(Rect::full(8, 4)));

        let again = pipeline.process_block(&[0.5; 512]).unwrap().unwrap();
        assert_eq!(again.outcome, CommitOutcome::Unchanged);
    }

    #[test]
    fn blocks_are_ignored_unless_running() {
        let config = config(2, 2);
        let mut pipeline = Pipeline::new(config, MemorySurface::new(2, 2)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.process_block(&[1.0; 512]).unwrap().is_none());

        pipeline.start(44_100).unwrap();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.surface().is_released());
        assert!(pipeline.process_block(&[1.0; 512]).unwrap().is_none());
        assert!(pipeline.start(44_100).is_err());
    }

    #[test]
    fn malformed_block_renders_silence() {
        let mut pipeline = running(config(4, 4));
        pipeline.process_block(&[1.0; 512]).unwrap();
        pipeline.process_block(&[1.0; 3]).unwrap();
        assert_eq!(pipeline.surface().pixels(), &[0u16; 16]);
        assert_eq!(pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn surface_fault_blanks_releases_and_stops() {
        let mut pipeline = flaky(4, 4);
        pipeline.process_block(&[1.0; 512]).unwrap();
        assert!(pipeline.surface().inner.pixels().iter().all(|p| *p == 0xFFFF));

        pipeline.surface_mut().fail_writes = true;
        let err = pipeline.process_block(&[1.0; 512]).unwrap_err();

        assert!(matches!(err, FbVizError::Surface(_)));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.surface().is_released());
        assert_eq!(pipeline.surface().inner.pixels(), &[0u16; 16]);
    }

    #[test]
    fn panic_while_rendering_takes_the_fault_path() {
        let mut pipeline = flaky(4, 4);
        assert_eq!(pipeline.process_block_isolated(&[1.0; 512]), PipelineState::Running);
        assert!(pipeline.surface().inner.pixels().iter().all(|p| *p == 0xFFFF));

        pipeline.surface_mut().panic_writes = true;
        let state = pipeline.process_block_isolated(&[1.0; 512]);

        assert_eq!(state, PipelineState::Stopped);
        assert!(pipeline.surface().is_released());
        assert_eq!(pipeline.surface().inner.pixels(), &[0u16; 16]);
        assert_eq!(pipeline.process_block_isolated(&[1.0; 512]), PipelineState::Stopped);
    }

    #[test]
    fn isolated_render_stops_on_surface_error() {
        let mut pipeline = flaky(4, 4);
        pipeline.surface_mut().fail_writes = true;

        assert_eq!(pipeline.process_block_isolated(&[1.0; 512]), PipelineState::Stopped);
        assert!(pipeline.surface().is_released());
        assert_eq!(pipeline.surface().inner.pixels(), &[0u16; 16]);
    }

    #[test]
    fn isolated_render_keeps_running_on_good_blocks() {
        let mut pipeline = running(config(4, 4));
        assert_eq!(pipeline.process_block_isolated(&[1.0; 512]), PipelineState::Running);
        assert_eq!(pipeline.surface().get(0, 0), 0xF800);
    }

    #[test]
    fn rejects_mismatched_surface() {
        let err = Pipeline::new(config(4, 4), MemorySurface::new(4, 5)).unwrap_err();
        assert!(matches!(err, FbVizError::Config(_)));
    }

    #[test]
    fn rejects_empty_frame_size() {
        let err = Pipeline::new(config(0, 0), MemorySurface::new(0, 0)).unwrap_err();
        assert!(matches!(err, FbVizError::Config(_)));
    }

    #[test]
    fn random_mode_scatters_every_sample() {
        let config = PipelineConfig {
            random: true,
            reshuffle: true,
            ..config(8, 8)
        };
        let mut pipeline = running(config);
        let ramp: Vec<f32> = (0..512).map(|i| i as f32 / 511.0).collect();
        pipeline.process_block(&ramp).unwrap();

        let mut shown = pipeline.surface().pixels().to_vec();
        shown.sort_unstable();
        let mut direct = running(self::config(8, 8));
        direct.process_block(&ramp).unwrap();
        let mut expected = direct.surface().pixels().to_vec();
        expected.sort_unstable();
        assert_eq!(shown, expected);
    }
}
