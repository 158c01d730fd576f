use crate::time::TickSource;

/// Blocks while `condition` holds, or until `timeout_ms` milliseconds have
/// elapsed on `ticks`.
#[inline]
pub(crate) fn blocking_wait_timeout_ms<T, F>(ticks: &mut T, mut condition: F, timeout_ms: u64) -> Result<(), ()>
where
    T: TickSource,
    F: FnMut() -> bool,
{
    let start = ticks.now_ms();

    while condition() {
        if ticks.now_ms().wrapping_sub(start) > timeout_ms {
            return Err(());
        }
        core::hint::spin_loop();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTicks;

    #[test]
    fn returns_immediately_when_condition_is_false() {
        let mut ticks = SimTicks::new();
        assert_eq!(blocking_wait_timeout_ms(&mut ticks, || false, 0), Ok(()));
        assert_eq!(ticks.elapsed_ms(), 1);
    }

    #[test]
    fn times_out_on_stuck_condition() {
        let mut ticks = SimTicks::new();
        assert_eq!(blocking_wait_timeout_ms(&mut ticks, || true, 5), Err(()));
        assert!(ticks.elapsed_ms() > 5);
    }

    #[test]
    fn condition_clearing_before_deadline_succeeds() {
        let mut ticks = SimTicks::new();
        let mut polls = 0;
        let res = blocking_wait_timeout_ms(
            &mut ticks,
            || {
                polls += 1;
                polls < 4
            },
            10,
        );
        assert_eq!(res, Ok(()));
        assert_eq!(polls, 4);
    }
}
