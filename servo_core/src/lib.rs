#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core servo-axis control logic (hardware-agnostic).
//!
//! All hardware interactions go through the `servo_traits::{Motor, Endstop,
//! Link, EdgeSource}` traits; time goes through `servo_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Decoder**: edge-triggered quadrature decoding into an atomic tick
//!   accumulator (`decoder` module)
//! - **Estimator**: position integration and EMA-filtered velocity
//!   (`estimator` module)
//! - **Control**: cascaded PID — position loop feeding the velocity loop
//!   (`pid` module, wired in [`ServoCore`])
//! - **Safety**: deadband/clamp bands and travel interlocks (`limits`)
//! - **Protocol**: resynchronizing framer and fixed-layout codecs
//!   (`protocol` module)
//! - **Scheduler**: cooperative fixed-period tick with every-pass interlock
//!   and link servicing ([`ServoCore::poll`])
//!
//! ## Concurrency
//!
//! The decoder's edge context and the scheduler share exactly one value, the
//! tick accumulator, through a lock-free atomic handoff. Every other piece
//! of state lives inside [`ServoCore`] and is touched only by the thread
//! driving `poll()`, so the framer, PID loops, limiter, and reporter need no
//! synchronization among themselves.

// Module declarations
pub mod conversions;
pub mod decoder;
pub mod error;
pub mod estimator;
pub mod limits;
pub mod mocks;
pub mod pid;
pub mod protocol;
pub mod runner;
pub mod util;

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use servo_traits::clock::{Clock, MonotonicClock};
use servo_traits::{Endstop, Link, Motor};

use crate::decoder::TickAccumulator;
use crate::error::{BuildError, Result, ServoError};
use crate::estimator::{MotionEstimator, MotionState};
use crate::limits::LimitsCfg;
use crate::pid::{Pid, PidGains, PidTerms};
use crate::protocol::{ControlMode, Frame, Framer, LoopSelect, Telemetry};

// For typed hardware error mapping
#[cfg(feature = "hardware-errors")]
use servo_hardware::HwError;

/// Duty command magnitude accepted by the motor driver.
pub const MAX_DUTY: f32 = 255.0;

/// Bytes drained from the link per scheduler pass; a chattier host just
/// spreads across passes.
const RX_CHUNK: usize = 64;

/// Control-rate configuration.
#[derive(Debug, Clone, Copy)]
pub struct ControlCfg {
    /// Control loop rate in Hz (one tick per period)
    pub loop_hz: u32,
    /// Emit one telemetry frame every this many ticks
    pub telemetry_downsample: u32,
    /// EMA smoothing factor for the velocity estimate, (0.0, 1.0]
    pub velocity_filter_alpha: f32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            loop_hz: 1000,
            telemetry_downsample: 10,
            velocity_filter_alpha: 0.05,
        }
    }
}

/// Axis geometry: how encoder ticks map onto linear travel.
#[derive(Debug, Clone, Copy)]
pub struct GeometryCfg {
    pub pulses_per_rev: f32,
    pub travel_mm_per_rev: f32,
}

impl Default for GeometryCfg {
    fn default() -> Self {
        Self {
            pulses_per_rev: 193.6,
            travel_mm_per_rev: 40.0,
        }
    }
}

/// Startup gains for both loops; replaceable at runtime via gains frames.
#[derive(Debug, Clone, Copy)]
pub struct GainsCfg {
    pub velocity: PidGains,
    pub position: PidGains,
}

impl Default for GainsCfg {
    fn default() -> Self {
        Self {
            velocity: PidGains::new(10.0, 0.1, 0.0),
            position: PidGains::new(20.0, 0.1, 10.0),
        }
    }
}

/// Outcome of a single scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The tick period had not elapsed; only interlocks and the link ran.
    Idle,
    /// One full control tick executed.
    Ticked,
}

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
///
/// The single controller context: every piece of mutable control state lives
/// here and is reached only through `poll()` on one thread.
pub struct ServoCore<M: Motor, E: Endstop, L: Link> {
    motor: M,
    endstop: E,
    link: L,
    // Unified clock for deterministic time in tests
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    // Epoch Instant for computing monotonic microseconds
    epoch: Instant,

    // Producer/consumer handoff with the decoder's edge context
    ticks: TickAccumulator,
    estimator: MotionEstimator,
    framer: Framer,
    limits: LimitsCfg,

    mode: ControlMode,
    target_velocity_mm_s: f32,
    target_position_mm: f32,
    velocity_pid: Pid,
    position_pid: Pid,
    // Velocity-loop terms from the latest tick, snapshotted into telemetry
    last_velocity_terms: PidTerms,

    period_us: u64,
    last_tick_us: u64,
    telemetry_downsample: u32,
    sample: u32,
}

impl<M: Motor, E: Endstop, L: Link> core::fmt::Debug for ServoCore<M, E, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServoCore")
            .field("mode", &self.mode)
            .field("target_velocity_mm_s", &self.target_velocity_mm_s)
            .field("target_position_mm", &self.target_position_mm)
            .field("encoder_ticks", &self.estimator.encoder_ticks())
            .finish()
    }
}

impl<M: Motor, E: Endstop, L: Link> ServoCore<M, E, L> {
    /// One cooperative scheduler pass.
    ///
    /// Runs a control tick when the fixed period has elapsed, then services
    /// the travel interlocks and the command link regardless of tick timing,
    /// so both stay more responsive than the tick itself. Never blocks.
    pub fn poll(&mut self) -> Result<PollStatus> {
        let now_us = self.clock.us_since(self.epoch);
        let mut status = PollStatus::Idle;
        if now_us.saturating_sub(self.last_tick_us) >= self.period_us {
            self.last_tick_us = now_us;
            self.control_tick()?;
            status = PollStatus::Ticked;
        }
        self.service_interlocks()?;
        self.service_link()?;
        Ok(status)
    }

    /// Exactly one control tick: drain → estimate → (position PID →)
    /// velocity PID → motor → downsampled telemetry, in that order.
    fn control_tick(&mut self) -> Result<()> {
        let delta = self.ticks.drain();
        let motion = self.estimator.update(delta);

        if self.mode == ControlMode::Position {
            let raw = self
                .position_pid
                .update(self.target_position_mm, motion.position_mm);
            self.target_velocity_mm_s = self.limits.velocity.apply(raw.output);
        }

        let terms = self
            .velocity_pid
            .update(self.target_velocity_mm_s, motion.velocity_mm_s);
        self.last_velocity_terms = terms;

        let duty = terms.output.clamp(-MAX_DUTY, MAX_DUTY) as i16;
        self.motor
            .drive(duty)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("drive motor")?;

        self.sample += 1;
        if self.sample >= self.telemetry_downsample {
            self.sample = 0;
            let frame = Telemetry {
                velocity: motion.velocity_mm_s,
                position: motion.position_mm,
                target_velocity: self.target_velocity_mm_s,
                target_position: self.target_position_mm,
                output: terms.output,
                p: terms.p,
                i: terms.i,
                d: terms.d,
            }
            .encode();
            // Telemetry is best-effort; a full or broken link must not
            // stall the control loop.
            if let Err(e) = self.link.send(&frame) {
                tracing::warn!(error = %e, "telemetry send failed");
            }
        }
        Ok(())
    }

    /// Travel interlocks, applied after control output and independent of
    /// PID state: retreating into an active endstop re-zeroes the axis;
    /// advancing past the soft stop halts the velocity target.
    fn service_interlocks(&mut self) -> Result<()> {
        let at_stop = self
            .endstop
            .is_active()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("read endstop")?;
        if at_stop && self.target_velocity_mm_s < 0.0 {
            self.target_velocity_mm_s = 0.0;
            self.estimator.re_zero();
            tracing::debug!("endstop active; velocity target held, axis re-zeroed");
        } else if self.estimator.state().position_mm > self.limits.soft_stop_mm
            && self.target_velocity_mm_s > 0.0
        {
            self.target_velocity_mm_s = 0.0;
            tracing::debug!(
                soft_stop_mm = self.limits.soft_stop_mm,
                "soft travel limit reached; velocity target held"
            );
        }
        Ok(())
    }

    /// Drain whatever bytes the link has right now through the framer.
    fn service_link(&mut self) -> Result<()> {
        let mut buf = [0u8; RX_CHUNK];
        let n = self
            .link
            .recv(&mut buf)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("link recv")?;
        for &byte in &buf[..n] {
            if let Some(frame) = self.framer.push(byte) {
                self.apply_frame(frame);
            }
        }
        Ok(())
    }

    /// Dispatch a completed frame into shared control state.
    pub fn apply_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Command(cmd) => {
                self.mode = cmd.mode;
                match cmd.mode {
                    ControlMode::Velocity => {
                        self.target_velocity_mm_s =
                            self.limits.velocity.apply(cmd.target_velocity);
                    }
                    ControlMode::Position => {
                        self.target_position_mm =
                            self.limits.position.apply(cmd.target_position);
                    }
                }
                tracing::debug!(
                    mode = ?cmd.mode,
                    target_velocity = self.target_velocity_mm_s,
                    target_position = self.target_position_mm,
                    "command applied"
                );
            }
            Frame::Gains(update) => {
                match update.target_loop {
                    LoopSelect::Velocity => self.velocity_pid.set_gains(update.gains),
                    LoopSelect::Position => self.position_pid.set_gains(update.gains),
                }
                tracing::debug!(target_loop = ?update.target_loop, "gains replaced");
            }
        }
    }

    /// Pause between idle passes; a fraction of the tick period so interlock
    /// and command latency stay well under one tick.
    pub fn idle_pause(&self) {
        self.clock.sleep(Duration::from_micros((self.period_us / 4).max(1)));
    }

    /// Stop the motor (best-effort).
    pub fn motor_stop(&mut self) -> Result<()> {
        self.motor
            .stop()
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("motor stop")
    }

    /// Handle for wiring a [`decoder::QuadratureDecoder`] to this core.
    pub fn tick_handle(&self) -> TickAccumulator {
        self.ticks.clone()
    }

    pub fn motion(&self) -> MotionState {
        self.estimator.state()
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// (velocity, position) targets currently in force.
    pub fn targets(&self) -> (f32, f32) {
        (self.target_velocity_mm_s, self.target_position_mm)
    }

    pub fn encoder_ticks(&self) -> i32 {
        self.estimator.encoder_ticks()
    }

    /// Velocity-loop terms from the latest control tick.
    pub fn last_terms(&self) -> PidTerms {
        self.last_velocity_terms
    }

    pub fn velocity_gains(&self) -> PidGains {
        self.velocity_pid.gains()
    }

    pub fn position_gains(&self) -> PidGains {
        self.position_pid.gains()
    }
}

// Map any error to a typed ServoError, with special handling for hardware errors.
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> ServoError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<HwError>() {
        return ServoError::HardwareFault(hw.to_string());
    }
    ServoError::Hardware(e.to_string())
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

use std::marker::PhantomData;

/// Public dynamic (boxed) servo controller that wraps the generic core.
pub struct Servo {
    inner: ServoCore<Box<dyn Motor>, Box<dyn Endstop>, Box<dyn Link>>,
}

impl core::fmt::Debug for Servo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.inner, f)
    }
}

impl Servo {
    /// Start building a Servo.
    pub fn builder() -> ServoBuilder<Missing, Missing, Missing> {
        ServoBuilder::default()
    }

    pub fn poll(&mut self) -> Result<PollStatus> {
        self.inner.poll()
    }

    pub fn apply_frame(&mut self, frame: Frame) {
        self.inner.apply_frame(frame);
    }

    pub fn idle_pause(&self) {
        self.inner.idle_pause();
    }

    pub fn motor_stop(&mut self) -> Result<()> {
        self.inner.motor_stop()
    }

    pub fn tick_handle(&self) -> TickAccumulator {
        self.inner.tick_handle()
    }

    pub fn motion(&self) -> MotionState {
        self.inner.motion()
    }

    pub fn mode(&self) -> ControlMode {
        self.inner.mode()
    }

    pub fn targets(&self) -> (f32, f32) {
        self.inner.targets()
    }

    pub fn encoder_ticks(&self) -> i32 {
        self.inner.encoder_ticks()
    }

    pub fn last_terms(&self) -> PidTerms {
        self.inner.last_terms()
    }
}

/// Builder for `Servo`. All fields are validated on `build()`.
pub struct ServoBuilder<M, E, L> {
    motor: Option<Box<dyn Motor>>,
    endstop: Option<Box<dyn Endstop>>,
    link: Option<Box<dyn Link>>,
    control: Option<ControlCfg>,
    limits: Option<LimitsCfg>,
    geometry: Option<GeometryCfg>,
    gains: Option<GainsCfg>,
    // Shared accumulator for an externally wired decoder
    ticks: Option<TickAccumulator>,
    // Optional clock for tests (accept Box here)
    clock: Option<Box<dyn Clock + Send + Sync>>,
    // Type-state markers
    _m: PhantomData<M>,
    _e: PhantomData<E>,
    _l: PhantomData<L>,
}

impl Default for ServoBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            motor: None,
            endstop: None,
            link: None,
            control: None,
            limits: None,
            geometry: None,
            gains: None,
            ticks: None,
            clock: None,
            _m: PhantomData,
            _e: PhantomData,
            _l: PhantomData,
        }
    }
}

impl<M, E, L> ServoBuilder<M, E, L> {
    /// Fallible build available in any type-state; returns detailed BuildError for missing pieces.
    pub fn try_build(self) -> Result<Servo> {
        let ServoBuilder {
            motor,
            endstop,
            link,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: _,
            _e: _,
            _l: _,
        } = self;

        let motor = motor.ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let endstop = endstop.ok_or_else(|| eyre::Report::new(BuildError::MissingEndstop))?;
        let link = link.ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;

        let inner = build_servo(
            motor,
            endstop,
            link,
            control.unwrap_or_default(),
            limits.unwrap_or_default(),
            geometry.unwrap_or_default(),
            gains.unwrap_or_default(),
            ticks,
            clock,
        )?;
        Ok(Servo { inner })
    }
}

/// Chainable setters that do not affect type-state
impl<M, E, L> ServoBuilder<M, E, L> {
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }
    pub fn with_limits(mut self, limits: LimitsCfg) -> Self {
        self.limits = Some(limits);
        self
    }
    pub fn with_geometry(mut self, geometry: GeometryCfg) -> Self {
        self.geometry = Some(geometry);
        self
    }
    pub fn with_gains(mut self, gains: GainsCfg) -> Self {
        self.gains = Some(gains);
        self
    }
    /// Share the tick accumulator an external decoder already records into.
    pub fn with_ticks(mut self, ticks: TickAccumulator) -> Self {
        self.ticks = Some(ticks);
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<E, L> ServoBuilder<Missing, E, L> {
    pub fn with_motor(self, motor: impl Motor + 'static) -> ServoBuilder<Set, E, L> {
        let ServoBuilder {
            motor: _,
            endstop,
            link,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: _,
            _e: _,
            _l: _,
        } = self;
        ServoBuilder {
            motor: Some(Box::new(motor)),
            endstop,
            link,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: PhantomData,
            _e: PhantomData,
            _l: PhantomData,
        }
    }
}

impl<M, L> ServoBuilder<M, Missing, L> {
    pub fn with_endstop(self, endstop: impl Endstop + 'static) -> ServoBuilder<M, Set, L> {
        let ServoBuilder {
            motor,
            endstop: _,
            link,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: _,
            _e: _,
            _l: _,
        } = self;
        ServoBuilder {
            motor,
            endstop: Some(Box::new(endstop)),
            link,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: PhantomData,
            _e: PhantomData,
            _l: PhantomData,
        }
    }
}

impl<M, E> ServoBuilder<M, E, Missing> {
    pub fn with_link(self, link: impl Link + 'static) -> ServoBuilder<M, E, Set> {
        let ServoBuilder {
            motor,
            endstop,
            link: _,
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: _,
            _e: _,
            _l: _,
        } = self;
        ServoBuilder {
            motor,
            endstop,
            link: Some(Box::new(link)),
            control,
            limits,
            geometry,
            gains,
            ticks,
            clock,
            _m: PhantomData,
            _e: PhantomData,
            _l: PhantomData,
        }
    }
}

impl ServoBuilder<Set, Set, Set> {
    /// Validate and build the Servo. Only available when Motor, Endstop, and Link are set.
    pub fn build(self) -> Result<Servo> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type ServoG<M, E, L> = ServoCore<M, E, L>;

/// Build a generic, statically-dispatched ServoG from concrete hardware.
#[allow(clippy::too_many_arguments)]
pub fn build_servo<M, E, L>(
    motor: M,
    endstop: E,
    link: L,
    control: ControlCfg,
    limits: LimitsCfg,
    geometry: GeometryCfg,
    gains: GainsCfg,
    ticks: Option<TickAccumulator>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ServoG<M, E, L>>
where
    M: Motor + 'static,
    E: Endstop + 'static,
    L: Link + 'static,
{
    if control.loop_hz == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "loop rate must be > 0",
        )));
    }
    if control.telemetry_downsample == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "telemetry downsample must be > 0",
        )));
    }
    let alpha = control.velocity_filter_alpha;
    if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "velocity filter alpha must be in (0, 1]",
        )));
    }
    if !(geometry.pulses_per_rev.is_finite() && geometry.pulses_per_rev > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pulses per revolution must be > 0",
        )));
    }
    if !(geometry.travel_mm_per_rev.is_finite() && geometry.travel_mm_per_rev > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "travel per revolution must be > 0",
        )));
    }
    if limits.velocity.min < 0.0 || !(limits.velocity.max > limits.velocity.min) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "velocity band must satisfy 0 <= min < max",
        )));
    }
    if !(limits.position.max > limits.position.min) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "position band must satisfy min < max",
        )));
    }
    if !(limits.soft_stop_mm > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "soft stop must be > 0",
        )));
    }

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();
    let period_us = util::period_us(control.loop_hz);

    Ok(ServoCore {
        motor,
        endstop,
        link,
        clock,
        epoch,
        ticks: ticks.unwrap_or_default(),
        estimator: MotionEstimator::new(
            geometry.pulses_per_rev,
            geometry.travel_mm_per_rev,
            control.loop_hz,
            alpha,
        ),
        framer: Framer::new(),
        limits,
        mode: ControlMode::default(),
        target_velocity_mm_s: 0.0,
        target_position_mm: 0.0,
        velocity_pid: Pid::new(gains.velocity),
        position_pid: Pid::new(gains.position),
        last_velocity_terms: PidTerms::default(),
        period_us,
        last_tick_us: 0,
        telemetry_downsample: control.telemetry_downsample,
        sample: 0,
    })
}
