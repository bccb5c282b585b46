//! Generic PID compute step with clamped integral.
//!
//! Two instances run in cascade: the position loop's output becomes the
//! velocity loop's target (after limiting), the velocity loop's output
//! becomes the motor duty command.

/// Anti-windup bound on the integral accumulator, both loops.
pub const INTEGRAL_LIMIT: f32 = 1000.0;

/// Proportional/integral/derivative gains for one loop. Replaced wholesale
/// by configuration packets, never merged field by field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

/// Per-tick breakdown of the last compute step, kept for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub output: f32,
}

/// One PID loop: gains plus the persistent integral/previous-error state.
/// State is never externally reset; the integral clamp is its only bound.
#[derive(Debug)]
pub struct Pid {
    gains: PidGains,
    integral: f32,
    prev_error: f32,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Wholesale gain replacement; integral and error history persist.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    /// One fixed-rate compute step.
    ///
    /// The derivative is `error - prev_error` with no division by the tick
    /// period: the constant tick rate folds the 1/dt factor into kd. If the
    /// scheduler period ever becomes variable this must divide by elapsed
    /// time.
    pub fn update(&mut self, target: f32, measured: f32) -> PidTerms {
        let error = target - measured;
        self.integral = (self.integral + error).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);
        let derivative = error - self.prev_error;
        self.prev_error = error;

        let p = error * self.gains.kp;
        let i = self.integral * self.gains.ki;
        let d = derivative * self.gains.kd;
        PidTerms {
            p,
            i,
            d,
            output: p + i + d,
        }
    }
}
