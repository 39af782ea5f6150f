/// Result alias that carries the custom [`FbVizError`] type.
pub type Result<T> = std::result::Result<T, FbVizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum FbVizError {
    /// Free-form message, mostly raised by the application layer.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A configuration or geometry invariant does not hold. Only raised while
    /// the pipeline is being built; geometry is immutable afterwards.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The display surface became unusable. Fatal for the pipeline.
    #[error("framebuffer surface fault: {0}")]
    Surface(String),
    /// Audio device or stream failure reported by the capture layer.
    #[error("audio error: {0}")]
    Audio(String),
    /// The real FFT rejected its buffers.
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
}

impl FbVizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn surface<T: Into<String>>(msg: T) -> Self {
        Self::Surface(msg.into())
    }

    pub fn audio<T: Into<String>>(msg: T) -> Self {
        Self::Audio(msg.into())
    }

    /// Returns `true` for faults that must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Surface(_) | Self::Config(_))
    }
}

impl From<&str> for FbVizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for FbVizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
