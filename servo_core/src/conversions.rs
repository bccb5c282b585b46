//! Mappings from the TOML-facing `servo_config` schemas into core configs.

use crate::limits::{Band, LimitsCfg};
use crate::pid::PidGains;
use crate::{ControlCfg, GainsCfg, GeometryCfg};

impl From<&servo_config::Control> for ControlCfg {
    fn from(c: &servo_config::Control) -> Self {
        Self {
            loop_hz: c.loop_hz,
            telemetry_downsample: c.telemetry_downsample,
            velocity_filter_alpha: c.velocity_filter_alpha,
        }
    }
}

impl From<&servo_config::Geometry> for GeometryCfg {
    fn from(g: &servo_config::Geometry) -> Self {
        Self {
            pulses_per_rev: g.pulses_per_rev,
            travel_mm_per_rev: g.travel_mm_per_rev,
        }
    }
}

impl From<&servo_config::Limits> for LimitsCfg {
    fn from(l: &servo_config::Limits) -> Self {
        Self {
            velocity: Band::new(l.min_velocity_mm_s, l.max_velocity_mm_s),
            position: Band::new(l.min_position_mm, l.max_position_mm),
            soft_stop_mm: l.soft_stop_mm,
        }
    }
}

impl From<servo_config::LoopGains> for PidGains {
    fn from(g: servo_config::LoopGains) -> Self {
        Self::new(g.kp, g.ki, g.kd)
    }
}

impl From<&servo_config::Gains> for GainsCfg {
    fn from(g: &servo_config::Gains) -> Self {
        Self {
            velocity: g.velocity.into(),
            position: g.position.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_map_onto_core_defaults() {
        let toml = "
[pins]
encoder_a = 2
encoder_b = 3
endstop = 13
motor_a = 6
motor_b = 7
motor_pwm = 5
";
        let cfg = servo_config::load_toml(toml).expect("parse");
        let control: ControlCfg = (&cfg.control).into();
        let limits: LimitsCfg = (&cfg.limits).into();
        let gains: GainsCfg = (&cfg.gains).into();

        assert_eq!(control.loop_hz, ControlCfg::default().loop_hz);
        assert_eq!(limits, LimitsCfg::default());
        assert_eq!(gains.velocity, GainsCfg::default().velocity);
        assert_eq!(gains.position, GainsCfg::default().position);
    }
}
