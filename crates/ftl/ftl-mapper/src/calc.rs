/// §4.4 step 2, a free function so the drain loop's batching math is
/// unit-testable without a running drain thread — grounded on the
/// teacher's practice of keeping hot-path arithmetic (`ring::seq_to_index`,
/// `ring::apply_overrun_policy`) as pure functions tested in isolation.
///
/// The hard rule every caller relies on: the result is always a multiple
/// of `min`, or zero.
pub fn calc_secs_to_sync(avail: u64, to_flush: u64, min: u64, max: u64) -> u64 {
    if avail >= max || to_flush >= max {
        return max;
    }
    if avail >= min {
        if to_flush > 0 {
            let mut n = (to_flush / min) * min;
            while n + min <= avail && n + min <= max {
                n += min;
            }
            n
        } else {
            (avail / min) * min
        }
    } else if to_flush > 0 {
        min
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_or_above_max_saturates() {
        assert_eq!(calc_secs_to_sync(100, 0, 4, 64), 64);
        assert_eq!(calc_secs_to_sync(0, 64, 4, 64), 64);
    }

    #[test]
    fn below_min_with_no_flush_is_zero() {
        assert_eq!(calc_secs_to_sync(2, 0, 4, 64), 0);
    }

    #[test]
    fn below_min_but_flushing_pads_up_to_min() {
        assert_eq!(calc_secs_to_sync(2, 2, 4, 64), 4);
    }

    #[test]
    fn avail_above_min_rounds_down_when_not_flushing() {
        assert_eq!(calc_secs_to_sync(10, 0, 4, 64), 8);
    }

    #[test]
    fn flushing_extends_rounded_flush_amount_while_under_caps() {
        // to_flush rounds down to 4, then greedily extends by 4 while
        // staying within avail (9) and max (64): 4 -> 8.
        assert_eq!(calc_secs_to_sync(9, 5, 4, 64), 8);
    }

    #[test]
    fn every_nonzero_result_is_a_multiple_of_min() {
        for avail in 0..20u64 {
            for to_flush in 0..20u64 {
                let n = calc_secs_to_sync(avail, to_flush, 4, 16);
                assert_eq!(n % 4, 0, "avail={avail} to_flush={to_flush} n={n}");
            }
        }
    }
}
