//! Frequency and tick-source types.

use core::fmt;
use core::ops;

/// Hertz
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hertz(pub u64);

impl Hertz {
    /// Create a `Hertz` from the given hertz.
    pub const fn hz(hertz: u64) -> Self {
        Self(hertz)
    }

    /// Create a `Hertz` from the given kilohertz.
    pub const fn khz(kilohertz: u64) -> Self {
        Self(kilohertz * 1_000)
    }

    /// Create a `Hertz` from the given megahertz.
    pub const fn mhz(megahertz: u64) -> Self {
        Self(megahertz * 1_000_000)
    }

    /// Frequency in hertz.
    pub const fn to_hz(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Hertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl ops::Div<u32> for Hertz {
    type Output = Hertz;
    fn div(self, rhs: u32) -> Self::Output {
        Hertz(self.0 / rhs as u64)
    }
}

/// Monotonic millisecond tick source used to bound every busy-poll.
pub trait TickSource {
    fn now_ms(&mut self) -> u64;
}

impl<T: TickSource + ?Sized> TickSource for &mut T {
    fn now_ms(&mut self) -> u64 {
        T::now_ms(self)
    }
}

/// Tick source backed by the `embassy-time` driver.
#[cfg(feature = "time")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyTicks;

#[cfg(feature = "time")]
impl TickSource for EmbassyTicks {
    fn now_ms(&mut self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
