//! GFG lane (reference mux + fractional PLL) configuration.

use super::{Band, ClockId, Error, Flexgen, PllConfig, PllLane, PllState, REF_MUX_INPUTS};
use crate::regs::{
    muxsel, PllCfgr1, PllCfgr2, PllCfgr3, PllCfgr4, PllCfgr5, PllCfgr6, PllCfgr7, Reg, RegisterAccess, PLLCFGR1,
    PLLCFGR2, PLLCFGR3, PLLCFGR4, PLLCFGR5, PLLCFGR6, PLLCFGR7,
};
use crate::time::TickSource;

fn lane_of(id: ClockId) -> Result<PllLane, Error> {
    match id.band() {
        Some(Band::Pll) => id.pll_lane().copied().ok_or(Error::InvalidClock),
        _ => {
            warn!("flexgen: {} is not a PLL output", id);
            Err(Error::InvalidClock)
        }
    }
}

fn pll_ready<R: RegisterAccess>(regs: &mut R, lane: u8) -> bool {
    regs.load::<PLLCFGR1::Register>(Reg::PllCfgr(lane, 1)).is_set(PLLCFGR1::PLLRDY)
}

fn check_ranges(cfg: &PllConfig) -> Result<(), Error> {
    let ok = (1..=63).contains(&cfg.ref_div)
        && (1..=4095).contains(&cfg.feedback_div)
        && cfg.frac_word < (1 << 24)
        && cfg.spread_depth <= 31
        && cfg.spread_freq <= 15
        && cfg.postdiv1 <= 7
        && cfg.postdiv2 <= 7;
    if ok {
        Ok(())
    } else {
        warn!("flexgen: {} configuration out of range", cfg.id);
        Err(Error::InvalidDivider)
    }
}

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Reprogram a GFG lane.
    ///
    /// Lanes with a bypass switch keep their dependents clocked from the
    /// reference while the PLL is reprogrammed. On lanes without one the
    /// caller must stop the dependents first. Register writes are not rolled
    /// back: a lock timeout leaves the lane configured, enabled and (where
    /// possible) still bypassed.
    pub fn configure_pll(&mut self, cfg: &PllConfig) -> Result<(), Error> {
        let lane = lane_of(cfg.id)?;
        let n = lane.lane;

        if cfg.state == PllState::Off {
            return self.disable_pll(&lane);
        }

        if cfg.state.bypasses() && !lane.has_bypass {
            warn!("flexgen: {} has no bypass", cfg.id);
            return Err(Error::InvalidClock);
        }
        let mux_code = REF_MUX_INPUTS.code_of(cfg.source).ok_or_else(|| {
            warn!("flexgen: {} cannot feed {}", cfg.source, cfg.id);
            Error::InvalidSource
        })?;
        check_ranges(cfg)?;

        if lane.has_bypass {
            self.regs.modify(Reg::PllCfgr(n, 4), PLLCFGR4::BYPASS::SET);
        }
        self.regs.modify(Reg::PllCfgr(n, 1), PLLCFGR1::PLLEN::CLEAR);

        self.regs.modify(Reg::MuxSelCfgr, muxsel(n).val(mux_code));

        self.regs.modify(
            Reg::PllCfgr(n, 2),
            PLLCFGR2::FREFDIV.val(cfg.ref_div as u32) + PLLCFGR2::FBDIV.val(cfg.feedback_div as u32),
        );
        self.regs.modify(
            Reg::PllCfgr(n, 3),
            PLLCFGR3::FRACIN.val(cfg.frac_word)
                + PLLCFGR3::DOWNSPREAD.val(cfg.spread_down as u32)
                + PLLCFGR3::DACEN.val(cfg.dac_enabled as u32)
                + PLLCFGR3::SSCGDIS.val((cfg.spread_depth == 0) as u32),
        );
        self.regs.modify(
            Reg::PllCfgr(n, 5),
            PLLCFGR5::DIVVAL.val(cfg.spread_freq as u32) + PLLCFGR5::SPREAD.val(cfg.spread_depth as u32),
        );
        self.regs.modify(Reg::PllCfgr(n, 6), PLLCFGR6::POSTDIV1.val(cfg.postdiv1 as u32));
        self.regs.modify(Reg::PllCfgr(n, 7), PLLCFGR7::POSTDIV2.val(cfg.postdiv2 as u32));
        self.regs.modify(
            Reg::PllCfgr(n, 4),
            PLLCFGR4::DSMEN.val(cfg.fractional as u32)
                + PLLCFGR4::FOUTPOSTDIVEN.val((cfg.postdiv1 != 0 || cfg.postdiv2 != 0) as u32),
        );

        if cfg.state.enables() {
            self.regs.modify(Reg::PllCfgr(n, 1), PLLCFGR1::PLLEN::SET);
            let timeout = self.config.pll_lock_timeout_ms;
            self.wait_while(timeout, |regs| !pll_ready(regs, n))
                .map_err(|_| {
                    error!("flexgen: {} did not lock", cfg.id);
                    Error::Timeout
                })?;
        }

        if lane.has_bypass && !cfg.state.bypasses() {
            self.regs.modify(Reg::PllCfgr(n, 4), PLLCFGR4::BYPASS::CLEAR);
        }

        debug!("flexgen: {} configured", cfg.id);
        Ok(())
    }

    fn disable_pll(&mut self, lane: &PllLane) -> Result<(), Error> {
        let n = lane.lane;
        self.regs.modify(Reg::PllCfgr(n, 1), PLLCFGR1::PLLEN::CLEAR);

        let timeout = self.config.pll_lock_timeout_ms;
        self.wait_while(timeout, |regs| pll_ready(regs, n))
            .map_err(|_| {
                warn!("flexgen: {} still reports lock after disable", lane.id);
                Error::Timeout
            })?;

        if lane.has_bypass {
            self.regs.modify(Reg::PllCfgr(n, 4), PLLCFGR4::BYPASS::CLEAR);
        }
        Ok(())
    }

    /// Decode the current configuration of PLL output `id`.
    pub fn get_pll_config(&mut self, id: ClockId) -> Result<PllConfig, Error> {
        let lane = lane_of(id)?;
        let n = lane.lane;
        let source = self.get_source(lane.mux)?.unwrap_or(ClockId::NONE);

        let cfgr1: PllCfgr1 = self.regs.load(Reg::PllCfgr(n, 1));
        let cfgr2: PllCfgr2 = self.regs.load(Reg::PllCfgr(n, 2));
        let cfgr3: PllCfgr3 = self.regs.load(Reg::PllCfgr(n, 3));
        let cfgr4: PllCfgr4 = self.regs.load(Reg::PllCfgr(n, 4));
        let cfgr5: PllCfgr5 = self.regs.load(Reg::PllCfgr(n, 5));

        let (postdiv1, postdiv2) = if cfgr4.is_set(PLLCFGR4::FOUTPOSTDIVEN) {
            let cfgr6: PllCfgr6 = self.regs.load(Reg::PllCfgr(n, 6));
            let cfgr7: PllCfgr7 = self.regs.load(Reg::PllCfgr(n, 7));
            (cfgr6.read(PLLCFGR6::POSTDIV1) as u8, cfgr7.read(PLLCFGR7::POSTDIV2) as u8)
        } else {
            (0, 0)
        };

        Ok(PllConfig {
            id,
            source,
            state: PllState::from_bits(
                cfgr1.is_set(PLLCFGR1::PLLEN),
                lane.has_bypass && cfgr4.is_set(PLLCFGR4::BYPASS),
            ),
            fractional: cfgr4.is_set(PLLCFGR4::DSMEN),
            ref_div: cfgr2.read(PLLCFGR2::FREFDIV) as u8,
            feedback_div: cfgr2.read(PLLCFGR2::FBDIV) as u16,
            frac_word: cfgr3.read(PLLCFGR3::FRACIN),
            spread_depth: cfgr5.read(PLLCFGR5::SPREAD) as u8,
            spread_freq: cfgr5.read(PLLCFGR5::DIVVAL) as u8,
            spread_down: cfgr3.is_set(PLLCFGR3::DOWNSPREAD),
            dac_enabled: cfgr3.is_set(PLLCFGR3::DACEN),
            postdiv1,
            postdiv2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcc::Config;
    use crate::sim::{SimRegisters, SimTicks};
    use crate::time::Hertz;

    fn flexgen() -> Flexgen<SimRegisters, SimTicks> {
        Flexgen::new(SimRegisters::new(), SimTicks::new(), Config::new())
    }

    #[test]
    fn configuration_reads_back() {
        let mut fg = flexgen();
        let cfg = PllConfig::new(ClockId::PLL5, ClockId::HSE)
            .with_dividers(5, 100)
            .with_fraction(0x40_0000)
            .with_spread(12, 3, true)
            .with_dac(true)
            .with_postdiv(2, 1);
        fg.configure_pll(&cfg).unwrap();
        assert_eq!(fg.get_pll_config(ClockId::PLL5), Ok(cfg));

        assert!(!PLLCFGR4::BYPASS.is_set(fg.regs().peek(Reg::PllCfgr(1, 4))));
        assert!(!PLLCFGR3::SSCGDIS.is_set(fg.regs().peek(Reg::PllCfgr(1, 3))));
        // 40 MHz / 5 × 100.25 / 2
        assert_eq!(fg.get_freq(ClockId::PLL5), Ok(Hertz(401_000_000)));
    }

    #[test]
    fn lock_timeout_leaves_lane_bypassed() {
        let mut fg = flexgen();
        fg.regs().pll_locks = false;
        let cfg = PllConfig::new(ClockId::PLL4, ClockId::MSI).with_dividers(1, 50);
        assert_eq!(fg.configure_pll(&cfg), Err(Error::Timeout));

        let state = fg.get_pll_config(ClockId::PLL4).unwrap().state;
        assert_eq!(state, PllState::OnBypass);
        assert_eq!(fg.get_freq(ClockId::PLL4), Ok(Hertz::mhz(16)));
    }

    #[test]
    fn bypass_only_keeps_pll_off() {
        let mut fg = flexgen();
        let cfg = PllConfig::new(ClockId::PLL6, ClockId::HSE)
            .with_dividers(1, 20)
            .with_state(PllState::Bypass);
        fg.configure_pll(&cfg).unwrap();
        assert_eq!(fg.get_pll_config(ClockId::PLL6).unwrap().state, PllState::Bypass);
        assert_eq!(fg.get_freq(ClockId::PLL6), Ok(Hertz::mhz(40)));
    }

    #[test]
    fn off_clears_enable_and_bypass() {
        let mut fg = flexgen();
        let cfg = PllConfig::new(ClockId::PLL7, ClockId::HSI)
            .with_dividers(2, 25)
            .with_state(PllState::OnBypass);
        fg.configure_pll(&cfg).unwrap();
        assert_eq!(fg.get_pll_config(ClockId::PLL7).unwrap().state, PllState::OnBypass);

        let writes = fg.regs().write_count();
        fg.configure_pll(&cfg.with_state(PllState::Off)).unwrap();
        assert_eq!(fg.regs().write_count(), writes + 2);
        let read = fg.get_pll_config(ClockId::PLL7).unwrap();
        assert_eq!(read.state, PllState::Off);
        // the off path does not touch the dividers
        assert_eq!((read.ref_div, read.feedback_div), (2, 25));
    }

    #[test]
    fn off_times_out_while_still_locked() {
        let mut fg = flexgen();
        let cfg = PllConfig::new(ClockId::PLL7, ClockId::HSI)
            .with_dividers(2, 25)
            .with_state(PllState::OnBypass);
        fg.configure_pll(&cfg).unwrap();
        fg.regs().pll_unlocks = false;

        assert_eq!(fg.configure_pll(&cfg.with_state(PllState::Off)), Err(Error::Timeout));
        let cfgr1 = fg.regs().peek(Reg::PllCfgr(3, 1));
        assert!(!PLLCFGR1::PLLEN.is_set(cfgr1));
        // dependents stay on the reference
        assert!(PLLCFGR4::BYPASS.is_set(fg.regs().peek(Reg::PllCfgr(3, 4))));
        assert_eq!(fg.get_freq(ClockId::PLL7), Ok(Hertz::mhz(64)));
    }

    #[test]
    fn rejected_before_any_write() {
        let mut fg = flexgen();
        let base = PllConfig::new(ClockId::PLL8, ClockId::HSE).with_dividers(1, 20);
        assert_eq!(
            fg.configure_pll(&base.with_state(PllState::Bypass)),
            Err(Error::InvalidClock)
        );
        assert_eq!(
            fg.configure_pll(&PllConfig { source: ClockId::LSE, ..base }),
            Err(Error::InvalidSource)
        );
        assert_eq!(fg.configure_pll(&base.with_dividers(0, 20)), Err(Error::InvalidDivider));
        assert_eq!(fg.configure_pll(&base.with_postdiv(8, 1)), Err(Error::InvalidDivider));
        assert_eq!(
            fg.configure_pll(&PllConfig { id: ClockId::MUXSEL4, ..base }),
            Err(Error::InvalidClock)
        );
        assert_eq!(fg.regs().write_count(), 0);

        // no bypass on this lane, but a plain enable is fine
        fg.configure_pll(&base).unwrap();
        assert_eq!(fg.get_freq(ClockId::PLL8), Ok(Hertz::mhz(800)));
    }
}
