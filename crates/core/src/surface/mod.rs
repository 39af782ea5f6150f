use std::{
    fmt,
    fs::{File, OpenOptions},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use serde::{Deserialize, Serialize};

use crate::{FbVizError, PixelFrame, Rect, Result};

/// Bytes per pixel of the packed RGB565 format the pipeline renders.
pub const BYTES_PER_PIXEL: usize = 2;

/// Display target the frame committer writes into.
///
/// The surface is a flat row-major `u16` array of `width * height` pixels.
/// Once [`FrameSurface::release`] has been called every access fails with a
/// surface fault.
pub trait FrameSurface {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Mutable view of all pixels.
    fn pixels_mut(&mut self) -> Result<&mut [u16]>;

    /// Drops the underlying mapping. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool;

    /// Copies a whole frame onto the surface.
    fn write_frame(&mut self, frame: &PixelFrame) -> Result<()> {
        let pixels = self.pixels_mut()?;
        if pixels.len() != frame.pixels().len() {
            return Err(FbVizError::surface(format!(
                "frame of {} pixels does not fit surface of {} pixels",
                frame.pixels().len(),
                pixels.len()
            )));
        }
        pixels.copy_from_slice(frame.pixels());
        Ok(())
    }

    /// Copies only `rect` of `frame` onto the surface.
    fn write_rect(&mut self, frame: &PixelFrame, rect: Rect) -> Result<()> {
        let width = self.width();
        if rect.x + rect.width > frame.width() || rect.y + rect.height > frame.height() {
            return Err(FbVizError::surface(format!("{rect:?} lies outside the frame")));
        }
        let pixels = self.pixels_mut()?;
        for y in rect.y..rect.y + rect.height {
            let start = y * width + rect.x;
            let row = &frame.row(y)[rect.x..rect.x + rect.width];
            pixels
                .get_mut(start..start + rect.width)
                .ok_or_else(|| FbVizError::surface(format!("row {y} lies outside the surface")))?
                .copy_from_slice(row);
        }
        Ok(())
    }

    /// Blanks the whole surface.
    fn clear(&mut self) -> Result<()> {
        self.pixels_mut()?.fill(0);
        Ok(())
    }
}

/// Heap-backed surface used for headless runs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySurface {
    width: usize,
    height: usize,
    pixels: Vec<u16>,
    released: bool,
    writes: usize,
}

impl MemorySurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
            released: false,
            writes: 0,
        }
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.pixels[y * self.width + x]
    }

    /// Number of times the pixels were handed out for writing.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl FrameSurface for MemorySurface {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixels_mut(&mut self) -> Result<&mut [u16]> {
        if self.released {
            return Err(FbVizError::surface("memory surface has been released"));
        }
        self.writes += 1;
        Ok(&mut self.pixels)
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

/// Geometry of a Linux framebuffer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramebufferGeometry {
    pub width: usize,
    pub height: usize,
    pub bits_per_pixel: usize,
}

impl FramebufferGeometry {
    /// Reads `virtual_size` and `bits_per_pixel` for `/dev/fb<index>` from sysfs.
    pub fn from_sysfs(index: u8) -> Result<Self> {
        let base = PathBuf::from(format!("/sys/class/graphics/fb{index}"));
        let size = std::fs::read_to_string(base.join("virtual_size"))?;
        let bpp = std::fs::read_to_string(base.join("bits_per_pixel"))?;
        let (width, height) = parse_virtual_size(&size)?;
        let bits_per_pixel = bpp
            .trim()
            .parse()
            .map_err(|_| FbVizError::config(format!("unreadable bits_per_pixel `{}`", bpp.trim())))?;

        Ok(Self {
            width,
            height,
            bits_per_pixel,
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel / 8
    }

    pub fn byte_len(&self) -> usize {
        self.width * self.height * self.bytes_per_pixel()
    }

    /// The pipeline only renders 16-bit RGB565 onto non-empty screens.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FbVizError::config(format!(
                "framebuffer geometry {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.bytes_per_pixel() != BYTES_PER_PIXEL {
            return Err(FbVizError::config(format!(
                "unsupported framebuffer depth of {} bits per pixel, expected 16",
                self.bits_per_pixel
            )));
        }
        Ok(())
    }
}

/// Parses the sysfs `virtual_size` contents, e.g. `"800,480\n"`.
pub fn parse_virtual_size(text: &str) -> Result<(usize, usize)> {
    let invalid = || FbVizError::config(format!("unreadable virtual_size `{}`", text.trim()));
    let (width, height) = text.trim().split_once(',').ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    Ok((width, height))
}

/// A `/dev/fb*` device mapped shared into memory.
pub struct FramebufferSurface {
    path: PathBuf,
    geometry: FramebufferGeometry,
    mapping: Option<Mapping>,
    _file: File,
}

struct Mapping {
    ptr: NonNull<libc::c_void>,
    byte_len: usize,
}

// The mapping is only reachable through `&mut self`, so moving the surface to
// the audio thread cannot introduce shared access.
unsafe impl Send for FramebufferSurface {}

impl FramebufferSurface {
    /// Opens `path` read/write and maps `width * height * 2` bytes of it.
    pub fn open(path: impl AsRef<Path>, geometry: FramebufferGeometry) -> Result<Self> {
        geometry.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let byte_len = geometry.byte_len();

        // SAFETY: the fd is open for read/write and outlives the mapping, which
        // is unmapped in `release` before `file` is dropped.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                byte_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            return Err(FbVizError::surface(format!(
                "failed to map {}: {err}",
                path.display()
            )));
        }
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| FbVizError::surface(format!("{} mapped at null", path.display())))?;

        tracing::info!(
            path = %path.display(),
            width = geometry.width,
            height = geometry.height,
            bytes = byte_len,
            "framebuffer mapped"
        );

        Ok(Self {
            path,
            geometry,
            mapping: Some(Mapping { ptr, byte_len }),
            _file: file,
        })
    }
}

impl FrameSurface for FramebufferSurface {
    fn width(&self) -> usize {
        self.geometry.width
    }

    fn height(&self) -> usize {
        self.geometry.height
    }

    fn pixels_mut(&mut self) -> Result<&mut [u16]> {
        let mapping = self.mapping.as_ref().ok_or_else(|| {
            FbVizError::surface(format!("{} is no longer mapped", self.path.display()))
        })?;
        // SAFETY: the mapping is page aligned, spans `byte_len` bytes and stays
        // valid until `release`, which needs `&mut self`.
        Ok(unsafe {
            std::slice::from_raw_parts_mut(
                mapping.ptr.as_ptr().cast::<u16>(),
                mapping.byte_len / BYTES_PER_PIXEL,
            )
        })
    }

    fn release(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            // SAFETY: the pointer and length come from a successful mmap.
            let rc = unsafe { libc::munmap(mapping.ptr.as_ptr(), mapping.byte_len) };
            if rc != 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %std::io::Error::last_os_error(),
                    "failed to unmap framebuffer"
                );
            } else {
                tracing::info!(path = %self.path.display(), "framebuffer released");
            }
        }
    }

    fn is_released(&self) -> bool {
        self.mapping.is_none()
    }
}

impl Drop for FramebufferSurface {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FramebufferSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferSurface")
            .field("path", &self.path)
            .field("geometry", &self.geometry)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}
