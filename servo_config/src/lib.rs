#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the servo axis controller.
//!
//! `Config` and sub-structs are deserialized from TOML and validated. The
//! defaults reproduce the reference axis: 1 kHz control loop, 193.6 encoder
//! pulses and 40 mm of travel per revolution, telemetry every 10th tick.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Pins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub endstop: u8,
    pub motor_a: u8,
    pub motor_b: u8,
    pub motor_pwm: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkCfg {
    /// Serial device for the command/telemetry byte stream
    pub device: String,
    pub baud: u32,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_string(),
            baud: 921_600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Control {
    /// Control loop rate in Hz (one tick per period)
    pub loop_hz: u32,
    /// Emit one telemetry frame every this many ticks
    pub telemetry_downsample: u32,
    /// EMA smoothing factor for the velocity estimate, (0.0, 1.0]
    pub velocity_filter_alpha: f32,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            loop_hz: 1000,
            telemetry_downsample: 10,
            velocity_filter_alpha: 0.05,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Geometry {
    /// Quadrature ticks per motor revolution
    pub pulses_per_rev: f32,
    /// Linear travel per motor revolution (mm)
    pub travel_mm_per_rev: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            pulses_per_rev: 193.6,
            travel_mm_per_rev: 40.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Limits {
    /// Velocity deadband threshold (mm/s); smaller magnitudes command zero
    pub min_velocity_mm_s: f32,
    pub max_velocity_mm_s: f32,
    pub min_position_mm: f32,
    pub max_position_mm: f32,
    /// Travel bound for the positive-direction interlock (mm)
    pub soft_stop_mm: f32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_velocity_mm_s: 4.9,
            max_velocity_mm_s: 400.1,
            min_position_mm: -0.1,
            max_position_mm: 200.1,
            soft_stop_mm: 200.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LoopGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Gains {
    pub velocity: LoopGains,
    pub position: LoopGains,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            velocity: LoopGains {
                kp: 10.0,
                ki: 0.1,
                kd: 0.0,
            },
            position: LoopGains {
                kp: 20.0,
                ki: 0.1,
                kd: 10.0,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub link: LinkCfg,
    #[serde(default)]
    pub control: Control,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub gains: Gains,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse, and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("failed to read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("failed to parse config: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.control.loop_hz == 0 {
            eyre::bail!("loop_hz must be > 0");
        }
        if self.control.telemetry_downsample == 0 {
            eyre::bail!("telemetry_downsample must be > 0");
        }
        let alpha = self.control.velocity_filter_alpha;
        if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
            eyre::bail!("velocity_filter_alpha must be in (0, 1]");
        }
        if !(self.geometry.pulses_per_rev.is_finite() && self.geometry.pulses_per_rev > 0.0) {
            eyre::bail!("pulses_per_rev must be > 0");
        }
        if !(self.geometry.travel_mm_per_rev.is_finite() && self.geometry.travel_mm_per_rev > 0.0) {
            eyre::bail!("travel_mm_per_rev must be > 0");
        }
        if !self.limits.max_velocity_mm_s.is_finite()
            || self.limits.max_velocity_mm_s <= self.limits.min_velocity_mm_s
        {
            eyre::bail!("max_velocity_mm_s must be > min_velocity_mm_s");
        }
        if self.limits.min_velocity_mm_s < 0.0 {
            eyre::bail!("min_velocity_mm_s must be >= 0");
        }
        if !self.limits.max_position_mm.is_finite()
            || self.limits.max_position_mm <= self.limits.min_position_mm
        {
            eyre::bail!("max_position_mm must be > min_position_mm");
        }
        if !self.limits.soft_stop_mm.is_finite() || self.limits.soft_stop_mm <= 0.0 {
            eyre::bail!("soft_stop_mm must be > 0");
        }
        for (name, g) in [("velocity", self.gains.velocity), ("position", self.gains.position)] {
            if !(g.kp.is_finite() && g.ki.is_finite() && g.kd.is_finite()) {
                eyre::bail!("{name} gains must be finite");
            }
        }
        if self.link.baud == 0 {
            eyre::bail!("link baud must be > 0");
        }
        Ok(())
    }
}
