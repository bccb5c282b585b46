use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;

use servo_core::limits::LimitsCfg;
use servo_core::mocks::{MemoryLink, NoopEndstop, NoopLink, NoopMotor};
use servo_core::pid::PidGains;
use servo_core::protocol::{
    Command, ControlMode, Frame, GainsUpdate, LoopSelect, TELEMETRY_LEN, TELEMETRY_MARKER,
    encode_command, encode_gains,
};
use servo_core::{
    ControlCfg, GainsCfg, GeometryCfg, PollStatus, ServoCore, build_servo,
};
use servo_traits::clock::ManualClock;
use servo_traits::{Endstop, Link, Motor};

/// Motor spy recording every duty command.
#[derive(Clone, Default)]
struct SpyMotor {
    duties: Arc<Mutex<Vec<i16>>>,
}
impl Motor for SpyMotor {
    fn drive(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(mut v) = self.duties.lock() {
            v.push(duty);
        }
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Endstop toggled from the test body.
#[derive(Clone, Default)]
struct ScriptedEndstop {
    active: Arc<AtomicBool>,
}
impl Endstop for ScriptedEndstop {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.active.load(Ordering::Relaxed))
    }
}

fn servo<M: Motor + 'static, E: Endstop + 'static, L: Link + 'static>(
    motor: M,
    endstop: E,
    link: L,
    clock: &ManualClock,
) -> ServoCore<M, E, L> {
    build_servo(
        motor,
        endstop,
        link,
        ControlCfg::default(),
        LimitsCfg::default(),
        GeometryCfg::default(),
        GainsCfg::default(),
        None,
        Some(Box::new(clock.clone())),
    )
    .expect("build servo")
}

fn tick(core: &mut ServoCore<impl Motor, impl Endstop, impl Link>, clock: &ManualClock) {
    clock.advance(Duration::from_millis(1));
    assert_eq!(core.poll().expect("poll"), PollStatus::Ticked);
}

#[test]
fn no_tick_until_period_elapses() {
    let clock = ManualClock::new();
    let mut core = servo(NoopMotor, NoopEndstop, NoopLink, &clock);

    assert_eq!(core.poll().expect("poll"), PollStatus::Idle);
    clock.advance(Duration::from_micros(999));
    assert_eq!(core.poll().expect("poll"), PollStatus::Idle);
    clock.advance(Duration::from_micros(1));
    assert_eq!(core.poll().expect("poll"), PollStatus::Ticked);
    // period restarts from the executed tick
    assert_eq!(core.poll().expect("poll"), PollStatus::Idle);
}

#[test]
fn command_over_link_applies_within_one_pass() {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    host.push_bytes(&encode_command(&Command {
        target_velocity: 100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    // An idle pass is enough: command ingestion is not gated by the tick.
    assert_eq!(core.poll().expect("poll"), PollStatus::Idle);
    assert_eq!(core.mode(), ControlMode::Velocity);
    assert_eq!(core.targets().0, 100.0);
}

#[rstest]
#[case::below_deadband(2.0, 0.0)]
#[case::in_band(120.0, 120.0)]
#[case::clamped_positive(100_000.0, 400.1)]
#[case::clamped_negative(-100_000.0, -400.1)]
fn velocity_commands_pass_through_the_limiter(#[case] sent: f32, #[case] stored: f32) {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    host.push_bytes(&encode_command(&Command {
        target_velocity: sent,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    core.poll().expect("poll");
    assert_eq!(core.targets().0, stored);
}

#[test]
fn position_commands_pass_through_the_limiter() {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    host.push_bytes(&encode_command(&Command {
        target_velocity: 0.0,
        target_position: 500.0,
        mode: ControlMode::Position,
    }));
    core.poll().expect("poll");
    assert_eq!(core.mode(), ControlMode::Position);
    assert_eq!(core.targets().1, 200.1);
}

#[test]
fn gains_frame_replaces_the_selected_loop_wholesale() {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    let new_gains = PidGains::new(3.0, 0.5, 0.25);
    host.push_bytes(&encode_gains(&GainsUpdate {
        gains: new_gains,
        target_loop: LoopSelect::Position,
    }));
    core.poll().expect("poll");
    assert_eq!(core.position_gains(), new_gains);
    // the other loop keeps its startup gains
    assert_eq!(core.velocity_gains(), GainsCfg::default().velocity);
}

#[test]
fn endstop_interlock_zeroes_target_and_rehomes() {
    let clock = ManualClock::new();
    let endstop = ScriptedEndstop::default();
    let mut core = servo(NoopMotor, endstop.clone(), NoopLink, &clock);

    // Retreating with some accumulated travel
    core.apply_frame(Frame::Command(Command {
        target_velocity: -100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    core.tick_handle().record(500);
    tick(&mut core, &clock);
    assert_eq!(core.targets().0, -100.0);
    assert_eq!(core.encoder_ticks(), 500);

    endstop.active.store(true, Ordering::Relaxed);
    core.poll().expect("poll");
    assert_eq!(core.targets().0, 0.0);
    assert_eq!(core.encoder_ticks(), 0);
}

#[test]
fn endstop_does_not_interfere_with_forward_motion() {
    let clock = ManualClock::new();
    let endstop = ScriptedEndstop::default();
    endstop.active.store(true, Ordering::Relaxed);
    let mut core = servo(NoopMotor, endstop, NoopLink, &clock);

    core.apply_frame(Frame::Command(Command {
        target_velocity: 100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    core.poll().expect("poll");
    // driving away from the stop is allowed
    assert_eq!(core.targets().0, 100.0);
}

#[test]
fn soft_limit_interlock_halts_forward_target() {
    let clock = ManualClock::new();
    let mut core = servo(NoopMotor, NoopEndstop, NoopLink, &clock);

    core.apply_frame(Frame::Command(Command {
        target_velocity: 100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    // ~200.4 mm of travel, past the 200 mm soft stop
    core.tick_handle().record(970);
    tick(&mut core, &clock);
    assert_eq!(core.targets().0, 0.0);

    // reverse targets are unaffected by the soft stop
    core.apply_frame(Frame::Command(Command {
        target_velocity: -100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    core.poll().expect("poll");
    assert_eq!(core.targets().0, -100.0);
}

#[test]
fn position_mode_cascades_into_a_limited_velocity_target() {
    let clock = ManualClock::new();
    let motor = SpyMotor::default();
    let mut core = servo(motor.clone(), NoopEndstop, NoopLink, &clock);

    core.apply_frame(Frame::Command(Command {
        target_velocity: 0.0,
        target_position: 100.0,
        mode: ControlMode::Position,
    }));
    tick(&mut core, &clock);

    // position error of 100 mm saturates the outer loop; its output lands
    // on the velocity band's ceiling, and the inner loop rails the duty
    assert_eq!(core.targets().0, 400.1);
    let duties = motor.duties.lock().expect("duties");
    assert_eq!(duties.as_slice(), &[255]);
}

#[test]
fn velocity_mode_skips_the_position_loop() {
    let clock = ManualClock::new();
    let mut core = servo(NoopMotor, NoopEndstop, NoopLink, &clock);

    core.apply_frame(Frame::Command(Command {
        target_velocity: 0.0,
        target_position: 150.0,
        mode: ControlMode::Position,
    }));
    core.apply_frame(Frame::Command(Command {
        target_velocity: 50.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    tick(&mut core, &clock);
    // the position target survives untouched but drives nothing
    assert_eq!(core.targets(), (50.0, 150.0));
}

#[test]
fn telemetry_emits_every_tenth_tick() {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    for _ in 0..9 {
        tick(&mut core, &clock);
    }
    assert!(host.sent_frames().is_empty());

    tick(&mut core, &clock);
    let frames = host.sent_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len(), TELEMETRY_LEN);
    assert_eq!(&frames[0][32..], &TELEMETRY_MARKER);

    for _ in 0..20 {
        tick(&mut core, &clock);
    }
    assert_eq!(host.sent_frames().len(), 2);
}

#[test]
fn telemetry_reflects_targets_and_terms() {
    let clock = ManualClock::new();
    let (link, host) = MemoryLink::new();
    let mut core = servo(NoopMotor, NoopEndstop, link, &clock);

    core.apply_frame(Frame::Command(Command {
        target_velocity: 100.0,
        target_position: 0.0,
        mode: ControlMode::Velocity,
    }));
    for _ in 0..10 {
        tick(&mut core, &clock);
    }
    let frames = host.sent_frames();
    assert_eq!(frames.len(), 1);
    let f32_at = |bytes: &[u8], i: usize| {
        f32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
    };
    // field order: vel, pos, target_vel, target_pos, output, p, i, d
    assert_eq!(f32_at(&frames[0], 2), 100.0);
    assert_eq!(f32_at(&frames[0], 3), 0.0);
    let terms = core.last_terms();
    assert_eq!(f32_at(&frames[0], 4), terms.output);
    assert_eq!(f32_at(&frames[0], 5), terms.p);
    assert_eq!(f32_at(&frames[0], 6), terms.i);
    assert_eq!(f32_at(&frames[0], 7), terms.d);
}

#[test]
fn stationary_velocity_hold_drives_zero_duty() {
    let clock = ManualClock::new();
    let motor = SpyMotor::default();
    let mut core = servo(motor.clone(), NoopEndstop, NoopLink, &clock);

    // zero target, zero measured velocity -> all PID terms zero
    tick(&mut core, &clock);
    tick(&mut core, &clock);
    let duties = motor.duties.lock().expect("duties");
    assert_eq!(duties.as_slice(), &[0, 0]);
}

#[test]
fn encoder_ticks_follow_drained_deltas_exactly() {
    let clock = ManualClock::new();
    let mut core = servo(NoopMotor, NoopEndstop, NoopLink, &clock);
    let handle = core.tick_handle();

    handle.record(3);
    handle.record(-1);
    tick(&mut core, &clock);
    assert_eq!(core.encoder_ticks(), 2);

    // nothing pending: the next drain must see zero, not a replay
    tick(&mut core, &clock);
    assert_eq!(core.encoder_ticks(), 2);

    handle.record(-5);
    tick(&mut core, &clock);
    assert_eq!(core.encoder_ticks(), -3);
}

#[test]
fn motor_failure_propagates_out_of_poll() {
    struct FailMotor;
    impl Motor for FailMotor {
        fn drive(&mut self, _d: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("bridge fault".into())
        }
        fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    let clock = ManualClock::new();
    let mut core = servo(FailMotor, NoopEndstop, NoopLink, &clock);
    clock.advance(Duration::from_millis(1));
    let err = core.poll().expect_err("drive failure should surface");
    let msg = format!("{err:#}");
    assert!(msg.contains("drive motor"), "unexpected error: {msg}");
}

#[test]
fn telemetry_send_failure_does_not_kill_the_loop() {
    struct DeafLink;
    impl Link for DeafLink {
        fn recv(&mut self, _buf: &mut [u8]) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
            Ok(0)
        }
        fn send(&mut self, _frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("tx buffer full".into())
        }
    }

    let clock = ManualClock::new();
    let mut core = servo(NoopMotor, NoopEndstop, DeafLink, &clock);
    for _ in 0..30 {
        tick(&mut core, &clock);
    }
}
