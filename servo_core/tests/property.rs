use proptest::prelude::*;
use servo_core::decoder::{QuadratureDecoder, TickAccumulator, phase_delta, phase_of};
use servo_core::limits::Band;
use servo_core::pid::{INTEGRAL_LIMIT, Pid, PidGains};
use servo_core::protocol::Framer;

proptest! {
    #[test]
    fn integral_term_never_leaves_its_clamp(
        history in prop::collection::vec((-1e4f32..1e4, -1e4f32..1e4), 1..300)
    ) {
        // ki = 1 makes the reported i term equal the raw accumulator
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 0.0));
        for (target, measured) in history {
            let terms = pid.update(target, measured);
            prop_assert!(terms.i >= -INTEGRAL_LIMIT && terms.i <= INTEGRAL_LIMIT);
        }
    }

    #[test]
    fn limiter_is_idempotent_and_band_shaped(v in -1e9f32..1e9) {
        let band = Band::new(4.9, 400.1);
        let once = band.apply(v);
        prop_assert_eq!(band.apply(once), once);
        if once != 0.0 {
            prop_assert!(once.abs() >= 4.9 && once.abs() <= 400.1);
            prop_assert_eq!(once.is_sign_negative(), v.is_sign_negative());
        }
    }

    #[test]
    fn decoder_total_matches_per_edge_delta_sum(
        edges in prop::collection::vec((any::<bool>(), any::<bool>()), 0..500),
        drain_every in 1usize..40,
    ) {
        let acc = TickAccumulator::new();
        let mut dec = QuadratureDecoder::new(acc.clone());

        // Independent fold of the published wrap rules
        let mut phase = 0u8;
        let mut expected: i64 = 0;
        for &(a, b) in &edges {
            let new = phase_of(a, b);
            expected += i64::from(phase_delta(phase, new));
            phase = new;
        }

        // Interleave drains at arbitrary points; nothing may be lost or
        // double-counted across them.
        let mut drained: i64 = 0;
        for (idx, &(a, b)) in edges.iter().enumerate() {
            dec.on_edge(a, b);
            if idx % drain_every == 0 {
                drained += i64::from(acc.drain());
            }
        }
        drained += i64::from(acc.drain());
        prop_assert_eq!(drained, expected);
        prop_assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn framer_survives_arbitrary_noise(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let mut framer = Framer::new();
        let mut frames = 0usize;
        for b in bytes.iter().copied() {
            if framer.push(b).is_some() {
                frames += 1;
            }
        }
        // a complete frame costs at least 16 bytes of input
        prop_assert!(frames <= bytes.len() / 16);
    }
}
