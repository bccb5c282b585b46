//! Real hardware backends: GPIO direction pins + software PWM for the
//! motor, a pulled-up endstop input, async edge interrupts for the
//! quadrature lines, and a non-blocking UART byte stream.

use crate::error::{HwError, Result};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use servo_traits::{EdgeSource, Endstop, Link, Motor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Software-PWM carrier for the duty output.
const PWM_HZ: f64 = 1000.0;

fn gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

/// H-bridge style driver: two direction lines plus one PWM magnitude line.
pub struct GpioMotor {
    dir_a: OutputPin,
    dir_b: OutputPin,
    pwm: OutputPin,
}

impl GpioMotor {
    pub fn new(dir_a_pin: u8, dir_b_pin: u8, pwm_pin: u8) -> Result<Self> {
        let gpio = gpio()?;
        let mut dir_a = gpio
            .get(dir_a_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let mut dir_b = gpio
            .get(dir_b_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let pwm = gpio
            .get(pwm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        dir_a.set_low();
        dir_b.set_low();
        Ok(Self { dir_a, dir_b, pwm })
    }

    fn apply(&mut self, duty: i16) -> Result<()> {
        let duty = duty.clamp(-255, 255);
        if duty >= 0 {
            self.dir_b.set_low();
            self.dir_a.set_high();
        } else {
            self.dir_a.set_low();
            self.dir_b.set_high();
        }
        let magnitude = f64::from(duty.unsigned_abs()) / 255.0;
        self.pwm
            .set_pwm_frequency(PWM_HZ, magnitude)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }
}

impl Motor for GpioMotor {
    fn drive(&mut self, duty: i16) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply(duty).map_err(Into::into)
    }

    fn stop(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.dir_a.set_low();
        self.dir_b.set_low();
        self.pwm.clear_pwm().map_err(|e| {
            Box::new(HwError::Gpio(e.to_string())) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}

/// Endstop input; `active_high` matches a normally-low switch wired to V+.
pub struct GpioEndstop {
    pin: InputPin,
    active_high: bool,
}

impl GpioEndstop {
    pub fn new(pin: u8, active_high: bool) -> Result<Self> {
        let pin = gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        Ok(Self { pin, active_high })
    }
}

impl Endstop for GpioEndstop {
    fn is_active(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pin.is_high() == self.active_high)
    }
}

/// Quadrature phase lines with async edge interrupts on both pins.
///
/// Each interrupt callback refreshes its own line's last-seen level, then
/// invokes the shared handler with both levels — the handler always sees a
/// consistent (A, B) sample without reading GPIO from interrupt context.
pub struct GpioQuadrature {
    pin_a: InputPin,
    pin_b: InputPin,
    level_a: Arc<AtomicBool>,
    level_b: Arc<AtomicBool>,
}

impl GpioQuadrature {
    pub fn new(pin_a: u8, pin_b: u8) -> Result<Self> {
        let gpio = gpio()?;
        let pin_a = gpio
            .get(pin_a)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        let pin_b = gpio
            .get(pin_b)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        let level_a = Arc::new(AtomicBool::new(pin_a.is_high()));
        let level_b = Arc::new(AtomicBool::new(pin_b.is_high()));
        Ok(Self {
            pin_a,
            pin_b,
            level_a,
            level_b,
        })
    }
}

impl EdgeSource for GpioQuadrature {
    fn subscribe(
        &mut self,
        handler: Box<dyn FnMut(bool, bool) + Send>,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let handler = Arc::new(Mutex::new(handler));

        let level_a = self.level_a.clone();
        let level_b = self.level_b.clone();
        let handler_a = handler.clone();
        self.pin_a
            .set_async_interrupt(Trigger::Both, move |level: Level| {
                level_a.store(level == Level::High, Ordering::Relaxed);
                if let Ok(mut h) = handler_a.lock() {
                    (*h)(
                        level_a.load(Ordering::Relaxed),
                        level_b.load(Ordering::Relaxed),
                    );
                }
            })
            .map_err(|e| Box::new(HwError::Gpio(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)?;

        let level_a = self.level_a.clone();
        let level_b = self.level_b.clone();
        self.pin_b
            .set_async_interrupt(Trigger::Both, move |level: Level| {
                level_b.store(level == Level::High, Ordering::Relaxed);
                if let Ok(mut h) = handler.lock() {
                    (*h)(
                        level_a.load(Ordering::Relaxed),
                        level_b.load(Ordering::Relaxed),
                    );
                }
            })
            .map_err(|e| Box::new(HwError::Gpio(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)?;
        Ok(())
    }
}

/// UART byte stream in non-blocking read mode.
pub struct UartLink {
    uart: rppal::uart::Uart,
}

impl UartLink {
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let mut uart =
            rppal::uart::Uart::with_path(device, baud, rppal::uart::Parity::None, 8, 1)
                .map_err(|e| HwError::Uart(e.to_string()))?;
        // Return immediately with whatever is buffered
        uart.set_read_mode(0, Duration::ZERO)
            .map_err(|e| HwError::Uart(e.to_string()))?;
        Ok(Self { uart })
    }
}

impl Link for UartLink {
    fn recv(&mut self, buf: &mut [u8]) -> std::result::Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        self.uart
            .read(buf)
            .map_err(|e| Box::new(HwError::Uart(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)
    }

    fn send(&mut self, frame: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut written = 0;
        while written < frame.len() {
            let n = self
                .uart
                .write(&frame[written..])
                .map_err(|e| Box::new(HwError::Uart(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)?;
            if n == 0 {
                return Err(Box::new(HwError::Uart("uart write stalled".to_string())));
            }
            written += n;
        }
        Ok(())
    }
}
