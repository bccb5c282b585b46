//! Test and helper mocks for servo_core

use crossbeam_channel as xch;
use servo_traits::{Endstop, Link, Motor};

/// A motor that accepts every command and remembers nothing.
pub struct NoopMotor;

impl Motor for NoopMotor {
    fn drive(&mut self, _duty: i16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// An endstop that is never reached.
pub struct NoopEndstop;

impl Endstop for NoopEndstop {
    fn is_active(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(false)
    }
}

/// A link with nothing to read that swallows every send.
pub struct NoopLink;

impl Link for NoopLink {
    fn recv(&mut self, _buf: &mut [u8]) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(0)
    }
    fn send(&mut self, _frame: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// In-memory link backed by channels; the controller side implements
/// [`Link`], the [`MemoryLinkHost`] plays the remote peer.
pub struct MemoryLink {
    rx: xch::Receiver<u8>,
    tx: xch::Sender<Vec<u8>>,
}

/// Peer handle for driving a [`MemoryLink`] from tests or a simulation.
#[derive(Clone)]
pub struct MemoryLinkHost {
    tx: xch::Sender<u8>,
    rx: xch::Receiver<Vec<u8>>,
}

impl MemoryLink {
    pub fn new() -> (Self, MemoryLinkHost) {
        let (byte_tx, byte_rx) = xch::unbounded();
        let (frame_tx, frame_rx) = xch::unbounded();
        (
            Self {
                rx: byte_rx,
                tx: frame_tx,
            },
            MemoryLinkHost {
                tx: byte_tx,
                rx: frame_rx,
            },
        )
    }
}

impl Link for MemoryLink {
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

impl MemoryLinkHost {
    /// Queue bytes for the controller to receive on its next link pass.
    pub fn push_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            // Receiver owned by the MemoryLink; a drop just ends the test.
            let _ = self.tx.send(b);
        }
    }

    /// Frames the controller has emitted so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }
}
