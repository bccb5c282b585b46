#![no_main]
use libfuzzer_sys::fuzz_target;
use servo_core::protocol::{Frame, Framer};

fuzz_target!(|data: &[u8]| {
    // Arbitrary byte streams must never panic the framer, and anything it
    // decodes must carry a well-formed mode/loop selector.
    let mut framer = Framer::new();
    for &byte in data {
        match framer.push(byte) {
            Some(Frame::Command(cmd)) => {
                let _ = cmd.mode.to_wire();
            }
            Some(Frame::Gains(update)) => {
                let _ = update.target_loop.to_wire();
            }
            None => {}
        }
    }
});
