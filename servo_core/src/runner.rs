//! Drive the controller forever.
//!
//! The system has no completion state: it polls until the caller raises the
//! shutdown flag (Ctrl-C handler, test harness, supervisor). Idle passes are
//! paced by the core's clock so interlocks and command ingestion still run
//! several times per control period without spinning a CPU core flat out.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::{PollStatus, ServoCore};
use servo_traits::{Endstop, Link, Motor};

/// Run the control loop until `shutdown` is set. The motor is stopped on the
/// way out, shutdown being the one path that ends an otherwise endless loop.
pub fn run<M, E, L>(core: &mut ServoCore<M, E, L>, shutdown: &AtomicBool) -> Result<()>
where
    M: Motor,
    E: Endstop,
    L: Link,
{
    tracing::info!("control loop start");
    while !shutdown.load(Ordering::Relaxed) {
        match core.poll()? {
            PollStatus::Ticked => {}
            PollStatus::Idle => core.idle_pause(),
        }
    }
    core.motor_stop()?;
    tracing::info!("control loop stop");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{NoopEndstop, NoopLink};
    use crate::{ControlCfg, GainsCfg, GeometryCfg, build_servo};
    use servo_traits::Motor;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct SpyMotor {
        stopped: Arc<AtomicBool>,
    }
    impl Motor for SpyMotor {
        fn drive(&mut self, _duty: i16) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
        fn stop(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.stopped.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn raised_shutdown_stops_motor_and_returns() {
        let stopped = Arc::new(AtomicBool::new(false));
        let motor = SpyMotor {
            stopped: stopped.clone(),
        };
        let mut core = build_servo(
            motor,
            NoopEndstop,
            NoopLink,
            ControlCfg::default(),
            crate::limits::LimitsCfg::default(),
            GeometryCfg::default(),
            GainsCfg::default(),
            None,
            None,
        )
        .expect("build servo");

        let shutdown = AtomicBool::new(true);
        run(&mut core, &shutdown).expect("run returns cleanly");
        assert!(stopped.load(Ordering::Relaxed));
    }
}
