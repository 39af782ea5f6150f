use serde::{Deserialize, Serialize};

use crate::{FrameSurface, PixelFrame, Rect, Result};

/// How composed frames reach the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    /// Copy every pixel on every frame.
    Full,
    /// Copy only the bounding box of pixels that changed since the last frame.
    Partial,
}

/// What a single commit did to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    Full,
    Partial(Rect),
    Unchanged,
}

/// Sole writer of the display surface. Owns the snapshot of the last frame
/// written in partial mode.
#[derive(Debug, Clone)]
pub struct FrameCommitter {
    mode: CommitMode,
    previous: PixelFrame,
}

impl FrameCommitter {
    pub fn new(mode: CommitMode, width: usize, height: usize) -> Self {
        Self {
            mode,
            previous: PixelFrame::new(width, height),
        }
    }

    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    pub fn previous(&self) -> &PixelFrame {
        &self.previous
    }

    pub fn commit<S: FrameSurface + ?Sized>(
        &mut self,
        frame: &PixelFrame,
        surface: &mut S,
    ) -> Result<CommitOutcome> {
        match self.mode {
            CommitMode::Full => {
                surface.write_frame(frame)?;
                Ok(CommitOutcome::Full)
            }
            CommitMode::Partial => {
                let Some(rect) = frame.changed_region(&self.previous) else {
                    return Ok(CommitOutcome::Unchanged);
                };
                surface.write_rect(frame, rect)?;
                self.previous.copy_from(frame);
                Ok(CommitOutcome::Partial(rect))
            }
        }
    }
}
