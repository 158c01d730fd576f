//! Bulk re-parenting of final-divider channels.

use super::{round_up_divider, ClockId, Error, Flexgen, XBAR_INPUTS};
use crate::regs::RegisterAccess;
use crate::time::TickSource;

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Move every enabled channel fed by `src1` over to `src2`.
    ///
    /// When `src2` is faster, each channel's divider is raised first so its
    /// output never exceeds what it was. Stops at the first error; channels
    /// already moved stay moved. Returns the number of channels moved.
    pub fn reroute_children(&mut self, src1: ClockId, src2: ClockId) -> Result<usize, Error> {
        if !src1.is_valid() || !src2.is_valid() {
            return Err(Error::InvalidClock);
        }
        let input = XBAR_INPUTS.code_of(src2).ok_or_else(|| {
            warn!("flexgen: cannot reroute to {}, not a crossbar input", src2);
            Error::InvalidSource
        })?;
        let f1 = self.get_freq(src1)?;
        let f2 = self.get_freq(src2)?;
        info!("flexgen: rerouting children of {} ({}) to {} ({})", src1, f1, src2, f2);

        let mut moved = 0;
        for id in ClockId::flexgen_channels() {
            let Some(channel) = id.channel() else { continue };
            if id == src1 || id == src2 || !self.channel_enabled(channel)? {
                continue;
            }
            if self.get_source(id)? != Some(src1) {
                continue;
            }

            if f2 > f1 {
                if f1.0 == 0 {
                    warn!("flexgen: {} runs at 0 Hz, no safe divider for {}", src1, id);
                    return Err(Error::InvalidSource);
                }
                let old = self.get_div(channel)?;
                let min = (old as u128 * f2.0 as u128).div_ceil(f1.0 as u128);
                let new = round_up_divider(u32::try_from(min).unwrap_or(u32::MAX)).inspect_err(|_| {
                    warn!("flexgen: {} cannot be divided down far enough for {}", id, src2);
                })?;
                if new != old {
                    debug!("flexgen: {} divider {} -> {}", id, old, new);
                    self.set_div(channel, new)?;
                }
            }

            self.set_crossbar(channel, input)?;
            debug!("flexgen: {} moved to {}", id, src2);
            moved += 1;
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcc::{ClockConfig, Config, MAX_DIVIDER};
    use crate::sim::{SimRegisters, SimTicks};
    use crate::time::Hertz;

    fn flexgen() -> Flexgen<SimRegisters, SimTicks> {
        let config = Config::new()
            .with_oscillator(ClockId::HSE, Hertz::mhz(100))
            .with_oscillator(ClockId::HSI, Hertz::mhz(200));
        Flexgen::new(SimRegisters::new(), SimTicks::new(), config)
    }

    #[test]
    fn faster_source_inflates_divider_first() {
        let mut fg = flexgen();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_2, ClockId::HSE).with_divider(2))
            .unwrap();
        assert_eq!(fg.get_freq(ClockId::FLEXGEN_2), Ok(Hertz::mhz(50)));

        assert_eq!(fg.reroute_children(ClockId::HSE, ClockId::HSI), Ok(1));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_2), Ok(Some(ClockId::HSI)));
        assert_eq!(fg.get_div(2), Ok(4));
        assert!(fg.get_freq(ClockId::FLEXGEN_2).unwrap() <= Hertz::mhz(50));
    }

    #[test]
    fn slower_source_keeps_divider() {
        let mut fg = flexgen();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_2, ClockId::HSI).with_divider(3))
            .unwrap();
        assert_eq!(fg.reroute_children(ClockId::HSI, ClockId::HSE), Ok(1));
        assert_eq!(fg.get_div(2), Ok(3));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_2), Ok(Some(ClockId::HSE)));
    }

    #[test]
    fn only_enabled_children_move() {
        let mut fg = flexgen();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_1, ClockId::HSE)).unwrap();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_2, ClockId::HSE).with_enabled(false))
            .unwrap();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_3, ClockId::MSI)).unwrap();

        assert_eq!(fg.reroute_children(ClockId::HSE, ClockId::LSE), Ok(1));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_1), Ok(Some(ClockId::LSE)));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_2), Ok(Some(ClockId::HSE)));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_3), Ok(Some(ClockId::MSI)));
    }

    #[test]
    fn first_error_aborts_and_keeps_earlier_moves() {
        let mut fg = flexgen();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_1, ClockId::HSE)).unwrap();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_2, ClockId::HSE).with_divider(MAX_DIVIDER))
            .unwrap();
        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_3, ClockId::HSE)).unwrap();

        assert_eq!(fg.reroute_children(ClockId::HSE, ClockId::HSI), Err(Error::InvalidDivider));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_1), Ok(Some(ClockId::HSI)));
        assert_eq!(fg.get_div(1), Ok(2));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_2), Ok(Some(ClockId::HSE)));
        assert_eq!(fg.get_source(ClockId::FLEXGEN_3), Ok(Some(ClockId::HSE)));
    }

    #[test]
    fn refuses_unusable_sources() {
        let mut fg = flexgen();
        assert_eq!(fg.reroute_children(ClockId::HSE, ClockId::APB1), Err(Error::InvalidSource));
        assert_eq!(fg.reroute_children(ClockId::NONE, ClockId::HSI), Err(Error::InvalidClock));

        fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_1, ClockId::I2S_CKIN)).unwrap();
        assert_eq!(
            fg.reroute_children(ClockId::I2S_CKIN, ClockId::HSE),
            Err(Error::InvalidSource)
        );
    }
}
