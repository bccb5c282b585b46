//! Hardware assembly and control-loop execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use servo_core::decoder::{QuadratureDecoder, TickAccumulator};
use servo_core::limits::LimitsCfg;
use servo_core::{ControlCfg, GainsCfg, GeometryCfg, build_servo, runner};
use servo_traits::EdgeSource;

use crate::cli::RtLock;
use crate::rt::setup_rt_once;

pub struct RunOpts {
    pub simulate: bool,
    pub run_ms: Option<u64>,
    pub rt: bool,
    pub rt_prio: Option<i32>,
    pub rt_lock: Option<RtLock>,
    pub rt_cpu: Option<usize>,
}

pub fn run_controller(cfg: &servo_config::Config, opts: RunOpts) -> eyre::Result<()> {
    setup_rt_once(
        opts.rt,
        opts.rt_prio,
        opts.rt_lock.unwrap_or(RtLock::os_default()),
        opts.rt_cpu,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
        })
        .wrap_err("install Ctrl-C handler")?;
    }
    if let Some(ms) = opts.run_ms {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            shutdown.store(true, Ordering::Relaxed);
        });
    }

    let control: ControlCfg = (&cfg.control).into();
    let limits: LimitsCfg = (&cfg.limits).into();
    let geometry: GeometryCfg = (&cfg.geometry).into();
    let gains: GainsCfg = (&cfg.gains).into();

    if opts.simulate {
        run_simulated(cfg, control, limits, geometry, gains, &shutdown)
    } else {
        run_hardware(cfg, control, limits, geometry, gains, &shutdown)
    }
}

fn run_simulated(
    cfg: &servo_config::Config,
    control: ControlCfg,
    limits: LimitsCfg,
    geometry: GeometryCfg,
    gains: GainsCfg,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    use servo_hardware::{LoopbackLink, RigCfg, SimulatedRig};

    let mut rig = SimulatedRig::new(RigCfg {
        pulses_per_rev: cfg.geometry.pulses_per_rev,
        travel_mm_per_rev: cfg.geometry.travel_mm_per_rev,
        ..RigCfg::default()
    });

    let ticks = TickAccumulator::new();
    let decoder = QuadratureDecoder::new(ticks.clone());
    rig.encoder()
        .subscribe(Box::new(decoder.into_edge_handler()))
        .map_err(|e| eyre::eyre!("subscribe simulated encoder: {e}"))?;

    // Telemetry lands on the loopback host; command bytes would come from
    // the same place if a peer were attached.
    let (link, host) = LoopbackLink::new();

    let mut core = build_servo(
        rig.motor(),
        rig.endstop(),
        link,
        control,
        limits,
        geometry,
        gains,
        Some(ticks),
        None,
    )?;

    tracing::info!("running against the simulated rig");
    runner::run(&mut core, shutdown)?;
    tracing::info!(
        telemetry_frames = host.sent_frames().len(),
        position_mm = rig.position_mm(),
        "simulation finished"
    );
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn run_hardware(
    cfg: &servo_config::Config,
    control: ControlCfg,
    limits: LimitsCfg,
    geometry: GeometryCfg,
    gains: GainsCfg,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    use servo_hardware::gpio::{GpioEndstop, GpioMotor, GpioQuadrature, UartLink};

    let pins = &cfg.pins;
    let motor = GpioMotor::new(pins.motor_a, pins.motor_b, pins.motor_pwm)
        .wrap_err("open motor pins")?;
    let endstop = GpioEndstop::new(pins.endstop, true).wrap_err("open endstop pin")?;
    let link = UartLink::open(&cfg.link.device, cfg.link.baud).wrap_err("open serial link")?;

    let ticks = TickAccumulator::new();
    let decoder = QuadratureDecoder::new(ticks.clone());
    let mut quadrature =
        GpioQuadrature::new(pins.encoder_a, pins.encoder_b).wrap_err("open encoder pins")?;
    quadrature
        .subscribe(Box::new(decoder.into_edge_handler()))
        .map_err(|e| eyre::eyre!("attach encoder interrupts: {e}"))?;

    let mut core = build_servo(
        motor, endstop, link, control, limits, geometry, gains, Some(ticks), None,
    )?;

    tracing::info!(
        device = %cfg.link.device,
        baud = cfg.link.baud,
        "running against hardware"
    );
    runner::run(&mut core, shutdown)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn run_hardware(
    _cfg: &servo_config::Config,
    _control: ControlCfg,
    _limits: LimitsCfg,
    _geometry: GeometryCfg,
    _gains: GainsCfg,
    _shutdown: &AtomicBool,
) -> eyre::Result<()> {
    eyre::bail!(
        "built without the `hardware` feature; pass --simulate or rebuild with --features hardware"
    )
}
