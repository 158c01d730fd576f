//! Flexgen clock-tree engine.
//!
//! [`Flexgen`] owns the register block and a tick source. Every operation
//! re-reads the hardware; nothing is cached between calls.

use core::fmt;

mod clock;
pub use clock::*;

mod topology;
pub use topology::*;

mod clock_config;
pub use clock_config::*;

mod clock_read;
mod divider;
pub use divider::*;

mod transaction;
mod xbar;
mod pll;

mod fcalc;
pub use fcalc::*;

mod reroute;

#[cfg(test)]
mod tests;

use crate::regs::RegisterAccess;
use crate::time::TickSource;
use crate::utils::blocking_wait_timeout_ms;

/// Clock-tree configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Identifier outside the valid range, or outside the band the operation expects.
    InvalidClock,
    /// Requested parent is not an input of the target stage.
    InvalidSource,
    /// Divider of zero or beyond what the pre/final divider pair can express.
    InvalidDivider,
    /// A polled busy/ready/lock condition did not settle in time.
    Timeout,
    /// The frequency calculator found no valid count in any time window.
    MeasurementFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidClock => "invalid clock",
            Error::InvalidSource => "invalid clock source",
            Error::InvalidDivider => "divider out of range",
            Error::Timeout => "timeout",
            Error::MeasurementFailed => "frequency measurement failed",
        })
    }
}

/// The flexgen block: reference muxes, PLL lanes, crossbar and final dividers.
///
/// Holding `&mut Flexgen` is holding the block; the engine does no locking
/// of its own.
pub struct Flexgen<R, T> {
    regs: R,
    ticks: T,
    config: Config,
}

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    pub fn new(regs: R, ticks: T, config: Config) -> Self {
        Self { regs, ticks, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Raw register access, bypassing every protocol of this module.
    pub fn regs(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn release(self) -> (R, T) {
        (self.regs, self.ticks)
    }

    /// Polls `condition` against the register block for up to `timeout_ms`.
    pub(crate) fn wait_while(
        &mut self,
        timeout_ms: u64,
        mut condition: impl FnMut(&mut R) -> bool,
    ) -> Result<(), ()> {
        let Self { regs, ticks, .. } = self;
        blocking_wait_timeout_ms(ticks, || condition(regs), timeout_ms)
    }
}
