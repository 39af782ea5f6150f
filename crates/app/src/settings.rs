//! Settings merged from built-in defaults, TOML config files and the command line.

use std::path::{Path, PathBuf};

use clap::Args;
use fbviz_core::{FbVizError, PipelineConfig, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BLEND_RATIO: f32 = 0.5;
const DEFAULT_BLOCK_SIZE: usize = 512;
const CONFIG_FILE_NAME: &str = "fbviz.toml";

/// Options shared by `run` and `show-config`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Enable debug output, including the once-per-second frame stats.
    #[arg(short, long)]
    pub debug: bool,
    /// Drive the pixels from the magnitude spectrum instead of the amplitude.
    #[arg(short, long)]
    pub freq: bool,
    /// Blend raster and mixed layouts.
    #[arg(short, long)]
    pub blend: bool,
    /// Use the pixelwise mixed layout.
    #[arg(short, long)]
    pub mixed: bool,
    /// Blend ratio between raster (0.0) and mixed (1.0).
    #[arg(short, long)]
    pub ratio: Option<f32>,
    /// Only write the changed region of each frame.
    #[arg(short, long)]
    pub partial: bool,
    /// Offset added to every amplitude (-1.0 to 1.0).
    #[arg(short, long, allow_hyphen_values = true)]
    pub offset: Option<f32>,
    /// Index of the audio input device, see `fbviz devices`.
    #[arg(short, long)]
    pub input_device: Option<usize>,
    /// Audio block size in samples.
    #[arg(long)]
    pub blocksize: Option<usize>,
    /// Scatter samples through a random pixel map.
    #[arg(long)]
    pub random: bool,
    /// Draw a fresh random pixel map every frame.
    #[arg(long)]
    pub reshuffle: bool,
    /// Render in grayscale.
    #[arg(long)]
    pub bw: bool,
    /// Framebuffer number, `/dev/fb<N>`.
    #[arg(long)]
    pub fb: Option<u8>,
    /// Seed for the random pixel map.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Override the detected framebuffer width.
    #[arg(long)]
    pub width: Option<usize>,
    /// Override the detected framebuffer height.
    #[arg(long)]
    pub height: Option<usize>,
    /// Read only this TOML config file instead of the default locations.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    settings: FileSettings,
}

/// Contents of the `[settings]` table. Every key is optional so files can be
/// layered on top of each other.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    debug: Option<bool>,
    use_frequency_mode: Option<bool>,
    use_blend_mode: Option<bool>,
    use_mixed_raw: Option<bool>,
    blend_ratio: Option<f32>,
    use_partial_update: Option<bool>,
    amplitude_offset: Option<f32>,
    input_device: Option<usize>,
    blocksize: Option<usize>,
    use_random: Option<bool>,
    reshuffle: Option<bool>,
    use_black_and_white: Option<bool>,
    fb: Option<u8>,
    seed: Option<u64>,
    width: Option<usize>,
    height: Option<usize>,
}

impl FileSettings {
    /// Keys present in `other` win.
    fn overlay(&mut self, other: FileSettings) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            debug,
            use_frequency_mode,
            use_blend_mode,
            use_mixed_raw,
            blend_ratio,
            use_partial_update,
            amplitude_offset,
            input_device,
            blocksize,
            use_random,
            reshuffle,
            use_black_and_white,
            fb,
            seed,
            width,
            height,
        );
    }
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub debug: bool,
    pub frequency_mode: bool,
    pub blend: bool,
    pub mixed: bool,
    pub blend_ratio: f32,
    pub partial_update: bool,
    pub amplitude_offset: f32,
    pub input_device: Option<usize>,
    pub block_size: usize,
    pub random: bool,
    pub reshuffle: bool,
    pub black_and_white: bool,
    pub fb: u8,
    pub seed: Option<u64>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    /// Config files that were actually read, in load order.
    pub config_files: Vec<PathBuf>,
}

impl Settings {
    /// Reads the config files and applies `args` on top.
    pub fn load(args: &RunArgs) -> Result<Self> {
        let (file, read) = match &args.config {
            Some(path) => (read_file(path)?, vec![path.clone()]),
            None => read_layered(&default_config_paths())?,
        };
        Ok(Self::merge(file, read, args))
    }

    fn merge(file: FileSettings, config_files: Vec<PathBuf>, args: &RunArgs) -> Self {
        let flag = |cli: bool, file: Option<bool>| cli || file.unwrap_or(false);

        let blend_ratio = args.ratio.or(file.blend_ratio).unwrap_or(DEFAULT_BLEND_RATIO);
        let amplitude_offset = args.offset.or(file.amplitude_offset).unwrap_or(0.0);

        let settings = Self {
            debug: flag(args.debug, file.debug),
            frequency_mode: flag(args.freq, file.use_frequency_mode),
            blend: flag(args.blend, file.use_blend_mode),
            mixed: flag(args.mixed, file.use_mixed_raw),
            blend_ratio,
            partial_update: flag(args.partial, file.use_partial_update),
            amplitude_offset,
            input_device: args.input_device.or(file.input_device),
            block_size: args.blocksize.or(file.blocksize).unwrap_or(DEFAULT_BLOCK_SIZE),
            random: flag(args.random, file.use_random),
            reshuffle: flag(args.reshuffle, file.reshuffle),
            black_and_white: flag(args.bw, file.use_black_and_white),
            fb: args.fb.or(file.fb).unwrap_or(0),
            seed: args.seed.or(file.seed),
            width: args.width.or(file.width),
            height: args.height.or(file.height),
            config_files,
        };

        let clamped = settings.pipeline_config(0, 0);
        Self {
            blend_ratio: clamped.blend_ratio,
            amplitude_offset: clamped.amplitude_offset,
            ..settings
        }
    }

    /// Path of the framebuffer device, `/dev/fb<N>`.
    pub fn fb_device(&self) -> PathBuf {
        PathBuf::from(format!("/dev/fb{}", self.fb))
    }

    /// Pipeline configuration for a screen of `width` x `height` pixels.
    pub fn pipeline_config(&self, width: usize, height: usize) -> PipelineConfig {
        PipelineConfig {
            blend_ratio: self.blend_ratio,
            amplitude_offset: self.amplitude_offset,
            frequency_mode: self.frequency_mode,
            blend: self.blend,
            mixed: self.mixed,
            random: self.random,
            reshuffle: self.reshuffle,
            partial_update: self.partial_update,
            black_and_white: self.black_and_white,
            block_size: self.block_size,
            width,
            height,
            seed: self.seed,
            diagnostics: self.debug,
        }
        .clamped()
    }
}

/// `/etc/fbviz.toml`, `~/.config/fbviz.toml` and `fbviz.toml` next to the
/// executable, lowest priority first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc").join(CONFIG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config").join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Reads every existing file in `paths`, later files overriding earlier ones.
/// Missing files are skipped.
fn read_layered(paths: &[PathBuf]) -> Result<(FileSettings, Vec<PathBuf>)> {
    let mut merged = FileSettings::default();
    let mut read = Vec::new();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        merged.overlay(read_file(path)?);
        read.push(path.clone());
    }
    Ok((merged, read))
}

fn read_file(path: &Path) -> Result<FileSettings> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| FbVizError::msg(format!("cannot read {}: {err}", path.display())))?;
    parse_settings(&text)
        .map_err(|err| FbVizError::msg(format!("invalid config {}: {err}", path.display())))
}

fn parse_settings(text: &str) -> std::result::Result<FileSettings, toml::de::Error> {
    toml::from_str::<SettingsFile>(text).map(|file| file.settings)
}
