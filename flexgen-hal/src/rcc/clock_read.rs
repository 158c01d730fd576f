//! Source and frequency resolution.
//!
//! Both walk the tree from the hardware registers on every call.

use super::{decode_input_selector, Band, ClockId, Error, Flexgen, PllLane, REF_MUX_INPUTS, XBAR_INPUTS};
use crate::regs::{
    muxsel, MuxSelCfgr, ObsCfgr, PllCfgr2, PllCfgr3, PllCfgr4, PllCfgr6, PllCfgr7, Reg, RegisterAccess, XbarCfgr,
    OBSCFGR, PLLCFGR2, PLLCFGR3, PLLCFGR4, PLLCFGR6, PLLCFGR7, XBARCFGR,
};
use crate::time::{Hertz, TickSource};

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Immediate parent of `id`, or `None` for an oscillator.
    pub fn get_source(&mut self, id: ClockId) -> Result<Option<ClockId>, Error> {
        let Some(band) = id.band() else {
            warn!("flexgen: invalid clock id {}", id.raw());
            return Err(Error::InvalidClock);
        };

        match band {
            Band::Oscillator => Ok(None),
            Band::RefMux => {
                let lane = id.pll_lane().ok_or(Error::InvalidClock)?;
                let cfgr: MuxSelCfgr = self.regs.load(Reg::MuxSelCfgr);
                let code = cfgr.read(muxsel(lane.lane));
                match REF_MUX_INPUTS.clock_at(code) {
                    Some(src) => Ok(Some(src)),
                    None => {
                        warn!("flexgen: {} selects unknown reference {}", id, code);
                        Err(Error::InvalidSource)
                    }
                }
            }
            Band::Pll => Ok(Some(id.pll_lane().ok_or(Error::InvalidClock)?.mux)),
            Band::Bus => Ok(Some(id.bus_clock().ok_or(Error::InvalidClock)?.parent)),
            Band::Flexgen => {
                let channel = id.channel().ok_or(Error::InvalidClock)?;
                let cfgr: XbarCfgr = self.regs.load(Reg::XbarCfgr(channel));
                let code = cfgr.read(XBARCFGR::SEL);
                match XBAR_INPUTS.clock_at(code) {
                    Some(src) => Ok(Some(src)),
                    None => {
                        warn!("flexgen: {} selects unknown crossbar input {}", id, code);
                        Err(Error::InvalidSource)
                    }
                }
            }
            Band::Observer => {
                let n = id.observer().ok_or(Error::InvalidClock)?;
                let cfgr: ObsCfgr = self.regs.load(Reg::ObsCfgr(n));
                let code = cfgr.read(OBSCFGR::CKINSEL);
                match decode_input_selector(code) {
                    Some(src) => Ok(Some(src)),
                    None => {
                        warn!("flexgen: {} selects unknown input {}", id, code);
                        Err(Error::InvalidSource)
                    }
                }
            }
        }
    }

    /// Current frequency of `id`, resolved back to an oscillator.
    pub fn get_freq(&mut self, id: ClockId) -> Result<Hertz, Error> {
        self.freq_at(id, 0)
    }

    fn freq_at(&mut self, id: ClockId, depth: u8) -> Result<Hertz, Error> {
        if depth > self.config.max_depth {
            error!("flexgen: resolving {} exceeded depth {}", id, self.config.max_depth);
            return Err(Error::InvalidClock);
        }

        let Some(source) = self.get_source(id)? else {
            return self.config.oscillator_freq(id).ok_or(Error::InvalidClock);
        };
        let parent = self.freq_at(source, depth + 1)?;

        let freq = match id.band().ok_or(Error::InvalidClock)? {
            Band::Oscillator | Band::RefMux => parent,
            Band::Pll => {
                let lane = *id.pll_lane().ok_or(Error::InvalidClock)?;
                self.pll_output(&lane, parent)
            }
            Band::Bus => parent / self.get_bus_divider(id)?,
            Band::Flexgen => {
                let channel = id.channel().ok_or(Error::InvalidClock)?;
                parent / self.get_div(channel)?
            }
            Band::Observer => parent / self.get_observer_divider(id)?,
        };

        trace!("flexgen: {} = {} (from {})", id, freq, source);
        Ok(freq)
    }

    /// Output of a GFG lane fed by `reference`:
    /// `ref × (fbdiv + frac / 2^24) / refdiv / (postdiv1 × postdiv2)`.
    fn pll_output(&mut self, lane: &PllLane, reference: Hertz) -> Hertz {
        let n = lane.lane;
        let cfgr4: PllCfgr4 = self.regs.load(Reg::PllCfgr(n, 4));
        if lane.has_bypass && cfgr4.is_set(PLLCFGR4::BYPASS) {
            return reference;
        }

        let cfgr2: PllCfgr2 = self.regs.load(Reg::PllCfgr(n, 2));
        let ref_div = cfgr2.read(PLLCFGR2::FREFDIV).max(1) as u128;
        let fb_div = cfgr2.read(PLLCFGR2::FBDIV) as u128;
        let frac = if cfgr4.is_set(PLLCFGR4::DSMEN) {
            let cfgr3: PllCfgr3 = self.regs.load(Reg::PllCfgr(n, 3));
            cfgr3.read(PLLCFGR3::FRACIN) as u128
        } else {
            0
        };
        let postdiv = if cfgr4.is_set(PLLCFGR4::FOUTPOSTDIVEN) {
            let cfgr6: PllCfgr6 = self.regs.load(Reg::PllCfgr(n, 6));
            let cfgr7: PllCfgr7 = self.regs.load(Reg::PllCfgr(n, 7));
            let p1 = cfgr6.read(PLLCFGR6::POSTDIV1).max(1);
            let p2 = cfgr7.read(PLLCFGR7::POSTDIV2).max(1);
            (p1 * p2) as u128
        } else {
            1
        };

        let num = reference.0 as u128 * ((fb_div << 24) + frac);
        let den = (ref_div << 24) * postdiv;
        Hertz((num / den) as u64)
    }
}
