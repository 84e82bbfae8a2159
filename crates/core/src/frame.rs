//! Camera frame buffers.
//!
//! A frame is a tightly packed, row-major `height × width × channels` buffer
//! of 8-bit samples, as read back from the simulator's camera sensor. Only
//! RGB (3 channels) and RGBA (4 channels) layouts are accepted.

use thiserror::Error;

/// Shape or layout violations when constructing or encoding a frame.
///
/// These indicate a caller bug (wrong buffer for the declared shape), not a
/// transient condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Channel count other than 3 or 4.
    #[error("unsupported channel count {0} (expected 3 or 4)")]
    UnsupportedChannels(usize),
    /// Zero-sized frame.
    #[error("frame has zero extent ({height}x{width})")]
    Empty {
        /// Declared height.
        height: usize,
        /// Declared width.
        width: usize,
    },
    /// Buffer length does not match `height * width * channels`.
    #[error("buffer holds {actual} bytes, shape requires {expected}")]
    LengthMismatch {
        /// Bytes implied by the shape.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },
    /// Frame is larger than the compressor accepts.
    #[error("frame dimensions {height}x{width} exceed encoder limit {limit}")]
    TooLarge {
        /// Declared height.
        height: usize,
        /// Declared width.
        width: usize,
        /// Maximum supported extent per axis.
        limit: usize,
    },
    /// The image compressor rejected the buffer.
    #[error("image compression failed: {0}")]
    Compression(String),
}

/// Owned `H × W × C` u8 image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<u8>,
}

impl ImageFrame {
    /// Wrap a raw buffer, validating it against the declared shape.
    pub fn from_raw(
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if channels != 3 && channels != 4 {
            return Err(FrameError::UnsupportedChannels(channels));
        }
        if height == 0 || width == 0 {
            return Err(FrameError::Empty { height, width });
        }
        let expected = height * width * channels;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// Solid-color RGB frame.
    pub fn filled_rgb(height: usize, width: usize, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let data = rgb.iter().copied().cycle().take(height * width * 3).collect();
        Self::from_raw(height, width, 3, data)
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Samples per pixel (3 or 4).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the frame carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// Raw samples.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy out the RGB samples, dropping alpha if present.
    ///
    /// Straight channel removal; no blending against a background.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        if self.channels == 3 {
            return self.data.clone();
        }
        let mut rgb = Vec::with_capacity(self.height * self.width * 3);
        for pixel in self.data.chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
        }
        rgb
    }
}
