//! stateless modulo helpers for the rotating status polls and the broadcast cycle counter

/// width of the broadcast counter field on the wire
const BROADCAST_COUNTER_MODULO: u8 = 16;

/// next cursor position, wrapping modulo `count`; callers guarantee `count > 0`
pub fn inc(index: usize, count: usize) -> usize {
    (index + 1) % count
}

/// next broadcast counter value, wrapping modulo the 4-bit wire field
///
/// devices compare successive values to detect skipped or duplicated cycles
pub fn broadcast_counter(current: u8) -> u8 {
    (current + 1) % BROADCAST_COUNTER_MODULO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_wraps() {
        assert_eq!(inc(0, 3), 1);
        assert_eq!(inc(2, 3), 0);
        assert_eq!(inc(0, 1), 0);
    }

    #[test]
    fn broadcast_counter_wraps_at_16() {
        let mut counter = 0;
        for expected in [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0, 1] {
            counter = broadcast_counter(counter);
            assert_eq!(counter, expected);
        }
    }
}
