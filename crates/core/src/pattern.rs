//! Synthetic camera frames.

use crate::{FrameError, ImageFrame, SimTick};

/// Moving color-bar pattern, shifted one column per tick.
///
/// `channels` must be 3 or 4; alpha (if any) is opaque.
pub fn test_pattern(
    height: usize,
    width: usize,
    channels: usize,
    tick: SimTick,
) -> Result<ImageFrame, FrameError> {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];
    let bar_width = (width / BARS.len()).max(1);
    let shift = tick.0 as usize;

    let mut data = Vec::with_capacity(height * width * channels);
    for y in 0..height {
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            let [r, g, b] = BARS[bar];
            let shade = (y * 64 / height.max(1)) as u8;
            data.extend_from_slice(&[r.saturating_sub(shade), g.saturating_sub(shade), b]);
            if channels > 3 {
                data.push(255);
            }
        }
    }
    ImageFrame::from_raw(height, width, channels, data)
}
