pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Motor driver: signed duty command in [-255, 255]. The implementation maps
/// the sign onto the two direction lines and the magnitude onto the PWM duty.
pub trait Motor {
    fn drive(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl Motor for Box<dyn Motor> {
    fn drive(&mut self, duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).drive(duty)
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).stop()
    }
}

/// Hard-stop sensor at the lower end of travel. Active means "at limit".
pub trait Endstop {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

impl Endstop for Box<dyn Endstop> {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).is_active()
    }
}

/// Byte-stream command/telemetry channel.
///
/// `recv` must not block: it copies whatever bytes are currently available
/// (possibly zero) into `buf` and returns the count.
pub trait Link {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
    fn send(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl Link for Box<dyn Link> {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        (**self).recv(buf)
    }
    fn send(&mut self, frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(frame)
    }
}

/// Edge-notify registration for the two quadrature phase lines.
///
/// The handler is invoked with the sampled (A, B) levels on every edge of
/// either line, from whatever context the implementation uses for edge
/// delivery (GPIO interrupt thread, simulation thread). The handler must not
/// block.
pub trait EdgeSource {
    fn subscribe(
        &mut self,
        handler: Box<dyn FnMut(bool, bool) + Send>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
