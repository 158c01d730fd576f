//! Engine configuration and channel-level reconfiguration.

use super::{compute_divider, input_selector, ClockConfig, ClockId, Error, Flexgen, XBAR_INPUTS};
use crate::_generated::{OSCILLATORS, OSC_COUNT};
use crate::regs::{BusDivr, FinDivCfgr, ObsCfgr, Reg, RegisterAccess, BUSDIVR, FINDIVCFGR, OBSCFGR};
use crate::time::{Hertz, TickSource};

/// Engine configuration.
///
/// Timeouts are in milliseconds of the injected [`TickSource`].
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Config {
    osc_freqs: [Hertz; OSC_COUNT],
    /// Pre/final divider busy flag.
    pub div_timeout_ms: u64,
    /// Crossbar switch, baseline. The completion poll retries with ten times this.
    pub xbar_timeout_ms: u64,
    /// PLL lock (and unlock on disable).
    pub pll_lock_timeout_ms: u64,
    /// One frequency-calculator run, sized for the slowest clock measured.
    pub fcalc_timeout_ms: u64,
    /// Frequency-calculator status clear after each run.
    pub fcalc_clear_timeout_ms: u64,
    /// Bus clock divider ready flag.
    pub bus_div_timeout_ms: u64,
    /// Resolver recursion bound.
    pub max_depth: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        let mut osc_freqs = [Hertz(0); OSC_COUNT];
        let mut i = 0;
        while i < OSC_COUNT {
            osc_freqs[i] = OSCILLATORS[i].nominal;
            i += 1;
        }
        Self {
            osc_freqs,
            div_timeout_ms: 1,
            xbar_timeout_ms: 1,
            pll_lock_timeout_ms: 2,
            fcalc_timeout_ms: 10,
            fcalc_clear_timeout_ms: 1,
            bus_div_timeout_ms: 1,
            max_depth: 8,
        }
    }

    /// Override the nominal frequency of an oscillator (board crystal, trimmed RC).
    ///
    /// Panics if `id` is not an oscillator. Use inside `const { }` blocks to
    /// get the check at compile time.
    pub const fn with_oscillator(mut self, id: ClockId, freq: Hertz) -> Self {
        let mut i = 0;
        while i < OSC_COUNT {
            if OSCILLATORS[i].id.0 == id.0 {
                self.osc_freqs[i] = freq;
                return self;
            }
            i += 1;
        }
        ::core::panic!("with_oscillator: not an oscillator");
    }

    pub const fn with_div_timeout_ms(mut self, ms: u64) -> Self {
        self.div_timeout_ms = ms;
        self
    }

    pub const fn with_xbar_timeout_ms(mut self, ms: u64) -> Self {
        self.xbar_timeout_ms = ms;
        self
    }

    pub const fn with_pll_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.pll_lock_timeout_ms = ms;
        self
    }

    pub const fn with_fcalc_timeout_ms(mut self, run_ms: u64, clear_ms: u64) -> Self {
        self.fcalc_timeout_ms = run_ms;
        self.fcalc_clear_timeout_ms = clear_ms;
        self
    }

    pub const fn with_bus_div_timeout_ms(mut self, ms: u64) -> Self {
        self.bus_div_timeout_ms = ms;
        self
    }

    pub const fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    /// Nominal frequency of oscillator `id`.
    pub fn oscillator_freq(&self, id: ClockId) -> Option<Hertz> {
        id.oscillator_index().map(|i| self.osc_freqs[i])
    }
}

// =============================================================================
// Bus divider table
// =============================================================================

/// Bus clock ratios, indexed by the `DIV` field code.
pub const BUS_DIVIDERS: [u32; 5] = [1, 2, 4, 8, 16];

const fn bus_div_decode(code: u32) -> u32 {
    if (code as usize) < BUS_DIVIDERS.len() {
        BUS_DIVIDERS[code as usize]
    } else {
        16
    }
}

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    pub(crate) fn check_channel(&self, channel: u8) -> Result<ClockId, Error> {
        ClockId::flexgen(channel as u16).ok_or_else(|| {
            warn!("flexgen: no final-divider channel {}", channel);
            Error::InvalidClock
        })
    }

    /// Whether the final divider of `channel` is enabled.
    pub fn channel_enabled(&mut self, channel: u8) -> Result<bool, Error> {
        self.check_channel(channel)?;
        let cfgr: FinDivCfgr = self.regs.load(Reg::FinDivCfgr(channel));
        Ok(cfgr.is_set(FINDIVCFGR::FINDIVEN))
    }

    pub fn enable_channel(&mut self, channel: u8) -> Result<(), Error> {
        self.check_channel(channel)?;
        self.regs.modify(Reg::FinDivCfgr(channel), FINDIVCFGR::FINDIVEN::SET);
        Ok(())
    }

    pub fn disable_channel(&mut self, channel: u8) -> Result<(), Error> {
        self.check_channel(channel)?;
        self.regs.modify(Reg::FinDivCfgr(channel), FINDIVCFGR::FINDIVEN::CLEAR);
        Ok(())
    }

    /// Read back the configuration of a final-divider channel.
    pub fn get_config(&mut self, id: ClockId) -> Result<ClockConfig, Error> {
        let channel = id.channel().ok_or(Error::InvalidClock)?;
        Ok(ClockConfig {
            id,
            source: self.get_source(id)?.unwrap_or(ClockId::NONE),
            divider: self.get_div(channel)?,
            enabled: self.channel_enabled(channel)?,
        })
    }

    /// Apply source, divider and enable state of a final-divider channel.
    ///
    /// The divider and the crossbar are written in the order that keeps the
    /// output at or below the larger of the old and new frequencies. The
    /// previous source must keep running until the switch completes.
    pub fn set_config(&mut self, cfg: &ClockConfig) -> Result<(), Error> {
        let channel = cfg.id.channel().ok_or_else(|| {
            warn!("flexgen: {} is not a final-divider channel", cfg.id);
            Error::InvalidClock
        })?;
        let input = XBAR_INPUTS.code_of(cfg.source).ok_or_else(|| {
            warn!("flexgen: {} is not a crossbar input", cfg.source);
            Error::InvalidSource
        })?;
        compute_divider(cfg.divider)?;

        let old_div = self.get_div(channel)?;
        if cfg.divider >= old_div {
            self.set_div(channel, cfg.divider)?;
            self.set_crossbar(channel, input)?;
        } else {
            self.set_crossbar(channel, input)?;
            self.set_div(channel, cfg.divider)?;
        }

        if cfg.enabled {
            self.enable_channel(channel)
        } else {
            self.disable_channel(channel)
        }
    }

    /// Switch every enabled channel to HSI, the always-present oscillator.
    ///
    /// Keeps going after a failed channel and returns the first error.
    pub fn route_all_to_safe_source(&mut self) -> Result<(), Error> {
        let input = XBAR_INPUTS.code_of(ClockId::HSI).ok_or(Error::InvalidSource)?;
        let mut first_err = None;

        for id in ClockId::flexgen_channels() {
            let Some(channel) = id.channel() else { continue };
            if !self.channel_enabled(channel)? {
                continue;
            }
            if let Err(e) = self.set_crossbar(channel, input) {
                error!("flexgen: {} stuck while falling back to hsi: {}", id, e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ratio of a bus clock divider.
    pub fn get_bus_divider(&mut self, id: ClockId) -> Result<u32, Error> {
        let bus = id.bus_clock().ok_or(Error::InvalidClock)?;
        let divr: BusDivr = self.regs.load(bus.divr);
        Ok(bus_div_decode(divr.read(BUSDIVR::DIV)))
    }

    /// Program a bus clock divider (1, 2, 4, 8 or 16) and wait for it to apply.
    pub fn set_bus_divider(&mut self, id: ClockId, div: u32) -> Result<(), Error> {
        let bus = *id.bus_clock().ok_or(Error::InvalidClock)?;
        let code = BUS_DIVIDERS
            .iter()
            .position(|&d| d == div)
            .ok_or(Error::InvalidDivider)? as u32;

        self.regs.modify(bus.divr, BUSDIVR::DIV.val(code));
        let timeout = self.config.bus_div_timeout_ms;
        self.wait_while(timeout, |regs| !regs.load::<BUSDIVR::Register>(bus.divr).is_set(BUSDIVR::RDY))
            .map_err(|_| {
                warn!("flexgen: {} divider not ready", id);
                Error::Timeout
            })
    }

    /// Route `clock` to observation output `obs`, divided by `div` (1..=64).
    pub fn set_observer(&mut self, obs: ClockId, clock: ClockId, div: u32, enabled: bool) -> Result<(), Error> {
        let n = obs.observer().ok_or(Error::InvalidClock)?;
        if !(1..=64).contains(&div) {
            return Err(Error::InvalidDivider);
        }
        let code = input_selector(clock).inspect_err(|_| {
            warn!("flexgen: {} cannot be observed", clock);
        })?;

        let mut cfgr = ObsCfgr::new(0);
        cfgr.write(OBSCFGR::CKINSEL.val(code) + OBSCFGR::DIV.val(div - 1) + OBSCFGR::EN.val(enabled as u32));
        self.regs.write(Reg::ObsCfgr(n), cfgr.get());
        Ok(())
    }

    /// Divider of observation output `obs`.
    pub fn get_observer_divider(&mut self, obs: ClockId) -> Result<u32, Error> {
        let n = obs.observer().ok_or(Error::InvalidClock)?;
        let cfgr: ObsCfgr = self.regs.load(Reg::ObsCfgr(n));
        Ok(cfgr.read(OBSCFGR::DIV) + 1)
    }
}
