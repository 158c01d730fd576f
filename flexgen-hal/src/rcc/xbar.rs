//! Crossbar switch controller.

use super::transaction::{GuardedWrite, Transaction};
use super::{ClockId, Error, Flexgen, XBAR_INPUTS};
use crate::regs::{Reg, RegisterAccess, XbarCfgr, XBARCFGR};
use crate::time::TickSource;

/// Completion-poll retry, as a multiple of the baseline crossbar timeout.
const XBAR_RETRY_FACTOR: u64 = 10;

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Switch `channel` to crossbar input code `input`.
    ///
    /// The previous input must keep running until the switch completes,
    /// otherwise the crossbar never reports completion and the switch is
    /// rolled back with `Timeout`.
    pub fn set_crossbar(&mut self, channel: u8, input: u32) -> Result<(), Error> {
        let id = self.check_channel(channel)?;
        if XBAR_INPUTS.clock_at(input).is_none() {
            warn!("flexgen: no crossbar input {}", input);
            return Err(Error::InvalidSource);
        }

        let mut cfgr: XbarCfgr = self.regs.load(Reg::XbarCfgr(channel));
        if cfgr.read(XBARCFGR::SEL) == input {
            return Ok(());
        }
        cfgr.modify(XBARCFGR::SEL.val(input) + XBARCFGR::EN::SET + XBARCFGR::STS::CLEAR);
        let timeout_ms = self.config.xbar_timeout_ms;
        Transaction::new(GuardedWrite {
            reg: Reg::XbarCfgr(channel),
            value: cfgr.get(),
            busy: (Reg::XbarCfgr(channel), XBARCFGR::STS::SET.into()),
            timeout_ms,
            retry_timeout_ms: Some(timeout_ms * XBAR_RETRY_FACTOR),
        })
        .run(self)?;

        debug!("flexgen: {} switched to input {}", id, input);
        Ok(())
    }

    /// Switch final-divider clock `id` to crossbar input `source`.
    pub fn set_source(&mut self, id: ClockId, source: ClockId) -> Result<(), Error> {
        let channel = id.channel().ok_or(Error::InvalidClock)?;
        let input = XBAR_INPUTS.code_of(source).ok_or_else(|| {
            warn!("flexgen: {} is not a crossbar input", source);
            Error::InvalidSource
        })?;
        self.set_crossbar(channel, input)
    }
}
