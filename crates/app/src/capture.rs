//! cpal input stream that runs the pipeline inside the audio callback.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedBufferSize,
};
use fbviz_core::{BlockAssembler, FbVizError, FrameSurface, Pipeline, PipelineState, Result};
use tracing::{error, info};

/// Running capture stream. Dropping it stops the callback and drops the
/// pipeline it owns.
pub struct AudioCapture {
    _stream: Stream,
    stopped: Arc<AtomicBool>,
    sample_rate: u32,
}

impl AudioCapture {
    /// Opens the input device, starts `pipeline` and hands it to the stream.
    /// Once `shutdown` is set the callback stops the pipeline.
    pub fn start<S>(
        device_index: Option<usize>,
        mut pipeline: Pipeline<S>,
        shutdown: &'static AtomicBool,
    ) -> Result<Self>
    where
        S: FrameSurface + Send + 'static,
    {
        let host = cpal::default_host();
        let device = select_device(&host, device_index)?;
        let supported = device
            .default_input_config()
            .map_err(|e| FbVizError::audio(format!("failed to get default input config: {e}")))?;

        let block_size = pipeline.config().block_size;
        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min as usize..=*max as usize).contains(&block_size) =>
            {
                BufferSize::Fixed(block_size as u32)
            }
            _ => BufferSize::Default,
        };
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size,
        };
        let sample_rate = config.sample_rate.0;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels = config.channels,
            buffer = ?config.buffer_size,
            format = ?supported.sample_format(),
            "opening audio input"
        );

        pipeline.start(sample_rate)?;
        let stopped = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32, S>(&device, &config, pipeline, shutdown, stopped.clone())?,
            SampleFormat::I16 => build_stream::<i16, S>(&device, &config, pipeline, shutdown, stopped.clone())?,
            SampleFormat::U16 => build_stream::<u16, S>(&device, &config, pipeline, shutdown, stopped.clone())?,
            format => {
                return Err(FbVizError::audio(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| FbVizError::audio(format!("failed to start stream: {e}")))?;
        info!("audio stream running");

        Ok(Self {
            _stream: stream,
            stopped,
            sample_rate,
        })
    }

    /// Whether the pipeline has reached `Stopped`, after a fault or a
    /// shutdown request.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// The `index`-th input device, or the host default.
pub fn select_device(host: &cpal::Host, index: Option<usize>) -> Result<Device> {
    match index {
        Some(index) => host
            .input_devices()
            .map_err(|e| FbVizError::audio(format!("failed to enumerate inputs: {e}")))?
            .nth(index)
            .ok_or_else(|| FbVizError::audio(format!("no input device with index {index}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| FbVizError::audio("no input device available")),
    }
}

/// Prints every input device with its index and default configuration.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| FbVizError::audio(format!("failed to enumerate inputs: {e}")))?;

    for (index, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        match device.default_input_config() {
            Ok(config) => println!(
                "{index}: {name} ({} Hz, {} ch, {:?})",
                config.sample_rate().0,
                config.channels(),
                config.sample_format()
            ),
            Err(err) => println!("{index}: {name} (unavailable: {err})"),
        }
    }
    Ok(())
}

fn build_stream<T, S>(
    device: &Device,
    config: &StreamConfig,
    mut pipeline: Pipeline<S>,
    shutdown: &'static AtomicBool,
    stopped: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
    S: FrameSurface + Send + 'static,
{
    let mut assembler = BlockAssembler::new(pipeline.config().block_size, config.channels as usize);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = data.iter().map(|s| f32::from_sample_(*s));
                if drive(&mut pipeline, &mut assembler, samples, shutdown) {
                    stopped.store(true, Ordering::Release);
                }
            },
            move |err| {
                error!(%err, "audio capture error");
            },
            None,
        )
        .map_err(|e| FbVizError::audio(format!("failed to build input stream: {e}")))
}

/// One callback's worth of work. A pending shutdown request stops the
/// pipeline first; otherwise every completed block is rendered. Returns
/// whether the pipeline is stopped.
fn drive<S, I>(
    pipeline: &mut Pipeline<S>,
    assembler: &mut BlockAssembler,
    samples: I,
    shutdown: &AtomicBool,
) -> bool
where
    S: FrameSurface,
    I: IntoIterator<Item = f32>,
{
    if shutdown.load(Ordering::Acquire) {
        pipeline.stop();
    }
    if pipeline.state() != PipelineState::Running {
        return pipeline.state() == PipelineState::Stopped;
    }

    assembler.push_interleaved(samples, |block| {
        pipeline.process_block_isolated(block);
    });
    pipeline.state() == PipelineState::Stopped
}
