//! Placeholder simulation driven by the tick loop.

use simrelay_core::{test_pattern, FrameError, ImageFrame, SimTick, TeleopController};

/// Fixed physics step in seconds.
pub const DT: f64 = 0.01;

/// Planar base pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// Kinematic stand-in for a physics scene: integrates the teleop command
/// into a planar pose and renders a synthetic camera image.
pub struct PatternSim {
    width: usize,
    height: usize,
    count: SimTick,
    pose: Pose,
    teleop: TeleopController,
}

impl PatternSim {
    pub fn new(width: usize, height: usize, speed_scale: f32) -> Self {
        Self {
            width,
            height,
            count: SimTick::ZERO,
            pose: Pose::default(),
            teleop: TeleopController::new(speed_scale),
        }
    }

    /// Reset scene, clock and step count.
    pub fn reset(&mut self) {
        self.count = SimTick::ZERO;
        self.stand();
    }

    /// Return to the standing pose. The clock and the teleop command are kept.
    pub fn stand(&mut self) {
        self.pose = Pose::default();
    }

    pub fn step(&mut self) {
        let (vx, vy, wz) = self.teleop.command().velocity();
        let (vx, vy, wz) = (f64::from(vx), f64::from(vy), f64::from(wz));
        let (sin, cos) = self.pose.yaw.sin_cos();
        self.pose.x += (vx * cos - vy * sin) * DT;
        self.pose.y += (vx * sin + vy * cos) * DT;
        self.pose.yaw += wz * DT;
        self.count = self.count.advance(1);
    }

    /// Steps taken since the last reset.
    pub fn count(&self) -> SimTick {
        self.count
    }

    /// Simulated seconds since the last reset.
    pub fn time(&self) -> f64 {
        self.count.0 as f64 * DT
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn teleop(&self) -> &TeleopController {
        &self.teleop
    }

    pub fn teleop_mut(&mut self) -> &mut TeleopController {
        &mut self.teleop
    }

    /// Current RGB camera image.
    pub fn camera_frame(&self) -> Result<ImageFrame, FrameError> {
        test_pattern(self.height, self.width, 3, self.count)
    }
}
