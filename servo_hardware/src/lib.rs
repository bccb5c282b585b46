//! Hardware backends for the servo axis controller.
//!
//! The simulated rig is always available and lets the whole stack run on a
//! host: a physics thread turns the commanded duty into quadrature edges,
//! trips the endstop at the bottom of travel, and stalls at either end. The
//! real GPIO/PWM/UART backends live behind the `hardware` feature (Linux,
//! `rppal`).

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use error::HwError;

use crossbeam_channel as xch;
use servo_traits::{EdgeSource, Endstop, Link, Motor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI64, Ordering};
use std::time::Duration;

/// Simulated axis parameters.
#[derive(Debug, Clone, Copy)]
pub struct RigCfg {
    pub pulses_per_rev: f32,
    pub travel_mm_per_rev: f32,
    /// Axis speed at full duty (mm/s)
    pub full_scale_mm_s: f32,
    /// Physical travel before the axis stalls against the far stop (mm)
    pub travel_mm: f32,
    /// Physics step
    pub step: Duration,
}

impl Default for RigCfg {
    fn default() -> Self {
        Self {
            pulses_per_rev: 193.6,
            travel_mm_per_rev: 40.0,
            full_scale_mm_s: 400.0,
            travel_mm: 205.0,
            step: Duration::from_micros(250),
        }
    }
}

/// Shared state between the rig's handles and its physics thread.
struct RigState {
    duty: AtomicI16,
    endstop: AtomicBool,
    // Tick count of the simulated carriage, written by the physics thread
    ticks: AtomicI64,
    shutdown: AtomicBool,
}

/// A simulated motor+encoder+endstop axis.
///
/// `motor()`, `endstop()` and `encoder()` hand out the pieces the controller
/// consumes; the physics thread starts when the encoder is subscribed and is
/// shut down and joined when the rig is dropped.
pub struct SimulatedRig {
    cfg: RigCfg,
    state: Arc<RigState>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SimulatedRig {
    pub fn new(cfg: RigCfg) -> Self {
        Self {
            cfg,
            state: Arc::new(RigState {
                duty: AtomicI16::new(0),
                endstop: AtomicBool::new(true), // carriage parked at home
                ticks: AtomicI64::new(0),
                shutdown: AtomicBool::new(false),
            }),
            join_handle: None,
        }
    }

    pub fn motor(&self) -> SimulatedMotor {
        SimulatedMotor {
            state: self.state.clone(),
        }
    }

    pub fn endstop(&self) -> SimulatedEndstop {
        SimulatedEndstop {
            state: self.state.clone(),
        }
    }

    pub fn encoder(&mut self) -> SimulatedEncoder<'_> {
        SimulatedEncoder { rig: self }
    }

    /// Carriage position according to the physics, in mm.
    pub fn position_mm(&self) -> f32 {
        let mm_per_tick = self.cfg.travel_mm_per_rev / self.cfg.pulses_per_rev;
        self.state.ticks.load(Ordering::Relaxed) as f32 * mm_per_tick
    }

    fn spawn_physics(&mut self, mut handler: Box<dyn FnMut(bool, bool) + Send>) {
        let cfg = self.cfg;
        let state = self.state.clone();
        let mm_per_tick = cfg.travel_mm_per_rev / cfg.pulses_per_rev;
        let max_ticks = (cfg.travel_mm / mm_per_tick) as i64;

        let join_handle = std::thread::spawn(move || {
            // Phase pattern (A, B) for indices 0..=3
            const LINES: [(bool, bool); 4] = [(false, false), (false, true), (true, true), (true, false)];
            let mut phase: i64 = 0;
            let mut carry: f32 = 0.0;
            let dt = cfg.step.as_secs_f32();

            loop {
                if state.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                let duty = state.duty.load(Ordering::Relaxed);
                let velocity = f32::from(duty) / 255.0 * cfg.full_scale_mm_s;
                carry += velocity / mm_per_tick * dt;
                let mut whole = carry as i64;
                carry -= whole as f32;

                while whole != 0 {
                    let step = whole.signum();
                    let ticks = state.ticks.load(Ordering::Relaxed);
                    // Stall against either mechanical stop
                    if (step < 0 && ticks <= 0) || (step > 0 && ticks >= max_ticks) {
                        carry = 0.0;
                        break;
                    }
                    phase += step;
                    let idx = phase.rem_euclid(4) as usize;
                    let (a, b) = LINES[idx];
                    handler(a, b);
                    state.ticks.store(ticks + step, Ordering::Relaxed);
                    whole -= step;
                }

                let ticks = state.ticks.load(Ordering::Relaxed);
                state.endstop.store(ticks <= 0, Ordering::Relaxed);
                std::thread::sleep(cfg.step);
            }
            tracing::trace!("rig physics thread exiting");
        });
        self.join_handle = Some(join_handle);
    }
}

impl Drop for SimulatedRig {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "rig physics thread panicked during shutdown");
            }
        }
    }
}

/// Simulated motor: stores the commanded duty for the physics thread.
pub struct SimulatedMotor {
    state: Arc<RigState>,
}

impl Motor for SimulatedMotor {
    fn drive(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state
            .duty
            .store(duty.clamp(-255, 255), Ordering::Relaxed);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.duty.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Simulated endstop, driven by the rig physics (active at home).
pub struct SimulatedEndstop {
    state: Arc<RigState>,
}

impl Endstop for SimulatedEndstop {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.state.endstop.load(Ordering::Relaxed))
    }
}

/// Simulated quadrature source; subscribing starts the physics thread.
pub struct SimulatedEncoder<'a> {
    rig: &'a mut SimulatedRig,
}

impl EdgeSource for SimulatedEncoder<'_> {
    fn subscribe(
        &mut self,
        handler: Box<dyn FnMut(bool, bool) + Send>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.rig.join_handle.is_some() {
            return Err(Box::new(std::io::Error::other(
                "rig physics already subscribed",
            )));
        }
        self.rig.spawn_physics(handler);
        Ok(())
    }
}

/// Loopback byte-stream link backed by channels; the host side feeds
/// command bytes in and collects telemetry frames out.
pub struct LoopbackLink {
    rx: xch::Receiver<u8>,
    tx: xch::Sender<Vec<u8>>,
}

#[derive(Clone)]
pub struct LoopbackHost {
    tx: xch::Sender<u8>,
    rx: xch::Receiver<Vec<u8>>,
}

impl LoopbackLink {
    pub fn new() -> (Self, LoopbackHost) {
        let (byte_tx, byte_rx) = xch::unbounded();
        let (frame_tx, frame_rx) = xch::unbounded();
        (
            Self {
                rx: byte_rx,
                tx: frame_tx,
            },
            LoopbackHost {
                tx: byte_tx,
                rx: frame_rx,
            },
        )
    }
}

impl Link for LoopbackLink {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.try_recv() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(_) => break,
            }
        }
        Ok(n)
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.tx.send(frame.to_vec()).map_err(|e| {
            Box::new(std::io::Error::other(e.to_string()))
                as Box<dyn std::error::Error + Send + Sync>
        })
    }
}

impl LoopbackHost {
    pub fn push_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            let _ = self.tx.send(b);
        }
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }
}
