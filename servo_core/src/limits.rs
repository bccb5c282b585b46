//! Target limiting and travel interlocks.
//!
//! Clamping is the error-handling strategy for out-of-range targets: nothing
//! is ever rejected or reported upstream.

/// Deadband-and-clamp band for signed magnitudes.
///
/// Values with magnitude below `min` map to exactly zero; anything else has
/// its magnitude clamped into [min, max] with the sign preserved. Applying
/// the band twice equals applying it once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn apply(&self, value: f32) -> f32 {
        if value > 0.0 && value > self.min {
            value.clamp(self.min, self.max)
        } else if value < 0.0 && value < -self.min {
            value.clamp(-self.max, -self.min)
        } else {
            0.0
        }
    }
}

/// Limiter configuration: velocity and position bands plus the travel bound
/// used by the positive-direction interlock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitsCfg {
    pub velocity: Band,
    pub position: Band,
    pub soft_stop_mm: f32,
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            velocity: Band::new(4.9, 400.1),
            position: Band::new(-0.1, 200.1),
            soft_stop_mm: 200.0,
        }
    }
}
