use servo_core::error::BuildError;
use servo_core::limits::{Band, LimitsCfg};
use servo_core::mocks::{NoopEndstop, NoopLink, NoopMotor};
use servo_core::{ControlCfg, Servo};

#[test]
fn missing_pieces_surface_as_typed_build_errors() {
    let err = Servo::builder().try_build().expect_err("no motor");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingMotor)
    ));

    let err = Servo::builder()
        .with_motor(NoopMotor)
        .try_build()
        .expect_err("no endstop");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingEndstop)
    ));

    let err = Servo::builder()
        .with_motor(NoopMotor)
        .with_endstop(NoopEndstop)
        .try_build()
        .expect_err("no link");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingLink)
    ));
}

#[test]
fn complete_builder_produces_a_working_controller() {
    let mut servo = Servo::builder()
        .with_motor(NoopMotor)
        .with_endstop(NoopEndstop)
        .with_link(NoopLink)
        .build()
        .expect("build servo");
    // First pass with a real clock is an idle pass at worst; it must not fail.
    servo.poll().expect("poll");
    assert_eq!(servo.encoder_ticks(), 0);
}

#[test]
fn zero_loop_rate_is_rejected() {
    let err = Servo::builder()
        .with_motor(NoopMotor)
        .with_endstop(NoopEndstop)
        .with_link(NoopLink)
        .with_control(ControlCfg {
            loop_hz: 0,
            ..ControlCfg::default()
        })
        .build()
        .expect_err("loop_hz 0 must fail");
    let msg = format!("{err}");
    assert!(msg.contains("loop rate must be > 0"), "got: {msg}");
}

#[test]
fn inverted_velocity_band_is_rejected() {
    let err = Servo::builder()
        .with_motor(NoopMotor)
        .with_endstop(NoopEndstop)
        .with_link(NoopLink)
        .with_limits(LimitsCfg {
            velocity: Band::new(100.0, 10.0),
            ..LimitsCfg::default()
        })
        .build()
        .expect_err("inverted band must fail");
    assert!(format!("{err}").contains("velocity band"));
}

#[test]
fn out_of_range_filter_alpha_is_rejected() {
    let err = Servo::builder()
        .with_motor(NoopMotor)
        .with_endstop(NoopEndstop)
        .with_link(NoopLink)
        .with_control(ControlCfg {
            velocity_filter_alpha: 1.5,
            ..ControlCfg::default()
        })
        .build()
        .expect_err("alpha out of range must fail");
    assert!(format!("{err}").contains("velocity filter alpha"));
}
