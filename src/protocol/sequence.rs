//! UDP sequence number staleness
//!
//! Sequence numbers are 8-bit and wrap, but the distance between two of them
//! is a plain difference in [-255, 255]. A wrap forward (255 then 0) is a
//! large negative step and lands outside the stale window, as does a jump
//! from 10 to 250.

/// Packets up to this many steps behind the stored sequence are stale
pub const STALE_WINDOW: i16 = 20;

/// Sequence assumed for a wand before its first datagram
pub const INITIAL_SEQ: u8 = 255;

/// Signed distance from `stored` to `new`
pub fn seq_diff(new: u8, stored: u8) -> i16 {
    new as i16 - stored as i16
}

/// A datagram is a duplicate or late retransmission when it is at most
/// `STALE_WINDOW - 1` steps behind, or equal to, the stored sequence.
pub fn is_stale(new: u8, stored: u8) -> bool {
    let diff = seq_diff(new, stored);
    diff > -STALE_WINDOW && diff <= 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_behind_stored() {
        for seq in 1..=10u8 {
            assert!(is_stale(seq, 10), "seq {} should be stale", seq);
        }
        assert!(is_stale(81, 100)); // 19 behind
        assert!(!is_stale(80, 100)); // 20 behind
        assert!(!is_stale(11, 10));
    }

    #[test]
    fn test_large_jump_back_is_accepted() {
        assert_eq!(seq_diff(250, 10), 240);
        assert!(!is_stale(250, 10));
        assert!(!is_stale(0, 10));
    }

    #[test]
    fn test_wrap_boundary() {
        assert_eq!(seq_diff(0, 255), -255);
        assert!(!is_stale(0, 255));
        assert!(!is_stale(5, 250));
        assert!(!is_stale(255, 0));
        assert!(is_stale(254, 255));
    }

    #[test]
    fn test_first_datagram_after_initial() {
        assert!(!is_stale(0, INITIAL_SEQ));
        assert!(is_stale(INITIAL_SEQ, INITIAL_SEQ));
        assert!(is_stale(240, INITIAL_SEQ));
    }

    proptest! {
        #[test]
        fn prop_forward_steps_accepted(stored in any::<u8>(), step in 1u8..=127) {
            prop_assert!(!is_stale(stored.wrapping_add(step), stored));
        }

        #[test]
        fn prop_recent_steps_rejected(stored in 19u8..=255, back in 0u8..20) {
            prop_assert!(is_stale(stored - back, stored));
        }
    }
}
