//! Interrupt-side quadrature decoding.
//!
//! The decoder runs in whatever context delivers sensor edges (GPIO
//! interrupt thread, simulation thread) and only ever touches the shared
//! [`TickAccumulator`]. The scheduler drains the accumulator exactly once
//! per control tick; together the drained total and the pending remainder
//! reconstruct the lifetime tick count with nothing lost or double-counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Lock-free single-slot handoff between the edge context and the scheduler.
///
/// A single `AtomicI32` is the whole shared surface: the producer adds with
/// `fetch_add`, the consumer drains with `swap(0)`. Widening this state
/// beyond one atomically-accessible unit would require an explicit critical
/// section around both sides.
#[derive(Debug, Clone, Default)]
pub struct TickAccumulator {
    ticks: Arc<AtomicI32>,
}

impl TickAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side: fold an edge delta into the pending count.
    #[inline]
    pub fn record(&self, delta: i32) {
        self.ticks.fetch_add(delta, Ordering::Release);
    }

    /// Consumer side: read-and-zero as one atomic step.
    #[inline]
    pub fn drain(&self) -> i32 {
        self.ticks.swap(0, Ordering::AcqRel)
    }

    /// Pending ticks not yet drained. Observational only.
    #[inline]
    pub fn pending(&self) -> i32 {
        self.ticks.load(Ordering::Acquire)
    }
}

/// Phase index for sampled (A, B) levels: 00, 01, 11, 10 — a Gray-code cycle.
#[inline]
pub fn phase_of(a: bool, b: bool) -> u8 {
    match (a, b) {
        (false, false) => 0,
        (false, true) => 1,
        (true, true) => 2,
        (true, false) => 3,
    }
}

/// Signed tick delta for one phase transition.
///
/// Forward wrap 3→0 is +1, reverse wrap 0→3 is −1; every other transition
/// contributes `new − old` directly, so a skipped phase (rotation faster
/// than edge servicing) lands as a multi-tick jump instead of being clamped.
#[inline]
pub fn phase_delta(old: u8, new: u8) -> i32 {
    if old == 3 && new == 0 {
        1
    } else if old == 0 && new == 3 {
        -1
    } else {
        i32::from(new) - i32::from(old)
    }
}

/// Edge-triggered quadrature decoder.
///
/// `on_edge` is the edge-notify entry point; it never blocks and never
/// drains the accumulator.
#[derive(Debug)]
pub struct QuadratureDecoder {
    phase: u8,
    ticks: TickAccumulator,
}

impl QuadratureDecoder {
    pub fn new(ticks: TickAccumulator) -> Self {
        Self { phase: 0, ticks }
    }

    #[inline]
    pub fn on_edge(&mut self, a: bool, b: bool) {
        let new_phase = phase_of(a, b);
        self.ticks.record(phase_delta(self.phase, new_phase));
        self.phase = new_phase;
    }

    /// Consume the decoder into a closure suitable for
    /// [`servo_traits::EdgeSource::subscribe`].
    pub fn into_edge_handler(mut self) -> impl FnMut(bool, bool) + Send {
        move |a, b| self.on_edge(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_table_matches_gray_cycle() {
        assert_eq!(phase_of(false, false), 0);
        assert_eq!(phase_of(false, true), 1);
        assert_eq!(phase_of(true, true), 2);
        assert_eq!(phase_of(true, false), 3);
    }

    #[test]
    fn wrap_transitions_are_single_ticks() {
        assert_eq!(phase_delta(3, 0), 1);
        assert_eq!(phase_delta(0, 3), -1);
    }

    #[test]
    fn adjacent_transitions_are_signed_steps() {
        assert_eq!(phase_delta(0, 1), 1);
        assert_eq!(phase_delta(1, 2), 1);
        assert_eq!(phase_delta(2, 1), -1);
        assert_eq!(phase_delta(1, 0), -1);
    }

    #[test]
    fn skipped_phase_is_a_jump_not_a_clamp() {
        assert_eq!(phase_delta(0, 2), 2);
        assert_eq!(phase_delta(3, 1), -2);
        assert_eq!(phase_delta(1, 3), 2);
    }

    #[test]
    fn forward_cycle_accumulates_four_ticks() {
        let acc = TickAccumulator::new();
        let mut dec = QuadratureDecoder::new(acc.clone());
        for (a, b) in [(false, true), (true, true), (true, false), (false, false)] {
            dec.on_edge(a, b);
        }
        assert_eq!(acc.drain(), 4);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn drain_is_read_and_zero() {
        let acc = TickAccumulator::new();
        acc.record(7);
        acc.record(-2);
        assert_eq!(acc.drain(), 5);
        assert_eq!(acc.drain(), 0);
        acc.record(-3);
        assert_eq!(acc.drain(), -3);
    }

    #[test]
    fn no_ticks_lost_across_concurrent_drains() {
        use std::thread;

        let acc = TickAccumulator::new();
        let producer = acc.clone();
        let handle = thread::spawn(move || {
            let mut dec = QuadratureDecoder::new(producer);
            // 1000 full forward cycles = 4000 ticks
            for _ in 0..1000 {
                for (a, b) in [(false, true), (true, true), (true, false), (false, false)] {
                    dec.on_edge(a, b);
                }
            }
        });

        let mut drained: i64 = 0;
        while !handle.is_finished() {
            drained += i64::from(acc.drain());
        }
        handle.join().expect("producer thread");
        drained += i64::from(acc.drain());
        assert_eq!(drained, 4000);
    }
}
