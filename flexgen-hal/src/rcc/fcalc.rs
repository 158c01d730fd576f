//! Frequency measurement with the on-chip frequency calculator.
//!
//! The calculator counts `clock` edges during a time window derived from
//! `reference`. Window code `w` spans `(1 << (w + 1)) + 5` reference
//! periods. Measurement starts at the widest window and narrows it on
//! counter overflow.

use super::{input_selector, ClockId, Error, Flexgen, FCALC_REF_INPUTS};
use crate::regs::{
    FcalcSr, Reg, RegisterAccess, FCALCCFGR, FCALCCR1, FCALCCR2, FCALCREFCKSELR, FCALCSR,
};
use crate::time::{Hertz, TickSource};

/// Widest time-window code.
pub const FCALC_WINDOW_MAX: u8 = 15;
/// Counter offset; counts at or below it carry no information.
pub const FCALC_COUNT_OFFSET: u32 = 16;

/// Frequency of a clock that counted `raw` edges in window `window` of `reference`.
///
/// `None` when the count is too small to use.
pub fn fcalc_frequency(raw: u32, reference: Hertz, window: u8) -> Option<Hertz> {
    if raw <= FCALC_COUNT_OFFSET {
        return None;
    }
    let periods = (1u64 << (window as u32 + 1)) + 5;
    Some(Hertz((raw - FCALC_COUNT_OFFSET) as u64 * reference.0 / periods))
}

fn fcalc_done<R: RegisterAccess>(regs: &mut R) -> bool {
    regs.load::<FCALCSR::Register>(Reg::FcalcSr).is_set(FCALCSR::STS)
}

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Measure the frequency of `clock` against `reference`.
    ///
    /// `reference` must be a frequency-calculator reference input; its
    /// frequency is resolved like any other clock. The calculator is left
    /// disabled.
    pub fn measure(&mut self, clock: ClockId, reference: ClockId) -> Result<Hertz, Error> {
        let input = input_selector(clock).inspect_err(|_| {
            warn!("flexgen: {} cannot be measured", clock);
        })?;
        let ref_code = FCALC_REF_INPUTS.code_of(reference).ok_or_else(|| {
            warn!("flexgen: {} is not a measurement reference", reference);
            Error::InvalidSource
        })?;
        let ref_freq = self.get_freq(reference)?;

        for window in (1..=FCALC_WINDOW_MAX).rev() {
            let started = self.fcalc_run(input, ref_code, window);
            let status: FcalcSr = self.regs.load(Reg::FcalcSr);
            let cleared = self.fcalc_reset();

            if started.is_err() {
                error!("flexgen: measuring {} timed out in window {}", clock, window);
                return Err(Error::MeasurementFailed);
            }
            if cleared.is_err() {
                error!("flexgen: frequency calculator status stuck");
                return Err(Error::MeasurementFailed);
            }

            if status.is_set(FCALCSR::OVF) {
                debug!("flexgen: {} overflows window {}", clock, window);
                continue;
            }
            let raw = status.read(FCALCSR::FVAL);
            match fcalc_frequency(raw, ref_freq, window) {
                Some(freq) => {
                    debug!("flexgen: {} measured {} (window {}, count {})", clock, freq, window, raw);
                    return Ok(freq);
                }
                None => debug!("flexgen: {} count {} too small in window {}", clock, raw, window),
            }
        }

        warn!("flexgen: measuring {} did not converge", clock);
        Err(Error::MeasurementFailed)
    }

    fn fcalc_run(&mut self, input: u32, ref_code: u32, window: u8) -> Result<(), ()> {
        let cfgr = FCALCCFGR::CKINSEL.val(input) + FCALCCFGR::FCALCCKEN::SET + FCALCCFGR::FCALCRSTN::SET;
        self.regs.write(Reg::FcalcCfgr, cfgr.into());
        self.regs
            .write(Reg::FcalcRefCkSelr, FCALCREFCKSELR::REFSEL.val(ref_code).into());
        self.regs.write(
            Reg::FcalcCr2,
            (FCALCCR2::TWC.val(window as u32) + FCALCCR2::MD::Application).into(),
        );
        self.regs.write(Reg::FcalcCr1, FCALCCR1::RUN::SET.into());

        let timeout = self.config.fcalc_timeout_ms;
        self.wait_while(timeout, |regs| !fcalc_done(regs))
    }

    fn fcalc_reset(&mut self) -> Result<(), ()> {
        self.regs.write(Reg::FcalcCr1, 0);
        self.regs
            .modify(Reg::FcalcCfgr, FCALCCFGR::FCALCCKEN::CLEAR + FCALCCFGR::FCALCRSTN::CLEAR);

        let timeout = self.config.fcalc_clear_timeout_ms;
        self.wait_while(timeout, fcalc_done)
    }
}
