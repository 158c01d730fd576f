//! Clock identifiers, topology descriptors and configuration descriptors.

use core::fmt;
use core::str::FromStr;

use super::Error;
use crate::_generated::{
    BUS_CLOCKS, BUS_RANGE, CLOCK_NAMES, FLEXGEN_RANGE, MUXSEL_RANGE, OBS_RANGE, OSCILLATORS, OSC_RANGE, PLL_LANES,
    PLL_RANGE,
};
use crate::regs::Reg;
use crate::time::Hertz;

pub use crate::_generated::{FLEXGEN_CHANNELS, OBSERVER_COUNT, PLL_LANE_COUNT};

// =============================================================================
// Clock identifiers
// =============================================================================

/// Identifier of a clock in the flexgen tree.
///
/// Identifiers are allocated band by band (see [`Band`]); `0` is
/// [`ClockId::NONE`] and [`ClockId::LAST`] is one past the last valid value.
/// The named constants (`ClockId::HSE`, `ClockId::PLL4`, `ClockId::FLEXGEN_12`,
/// ...) are generated from `data/flexgen.yaml`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockId(pub(crate) u16);

/// Role of a clock, derived from its numeric range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Band {
    Oscillator,
    /// Output of a PLL reference multiplexer (MUXSEL).
    RefMux,
    Pll,
    Bus,
    /// Output of a final-divider channel behind the crossbar.
    Flexgen,
    Observer,
}

impl ClockId {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Output clock of final-divider channel `channel`.
    pub const fn flexgen(channel: u16) -> Option<Self> {
        if channel < FLEXGEN_CHANNELS {
            Some(Self(FLEXGEN_RANGE.start + channel))
        } else {
            None
        }
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 < Self::LAST.0
    }

    pub const fn band(self) -> Option<Band> {
        let v = self.0;
        if v >= OSC_RANGE.start && v < OSC_RANGE.end {
            Some(Band::Oscillator)
        } else if v >= MUXSEL_RANGE.start && v < MUXSEL_RANGE.end {
            Some(Band::RefMux)
        } else if v >= PLL_RANGE.start && v < PLL_RANGE.end {
            Some(Band::Pll)
        } else if v >= BUS_RANGE.start && v < BUS_RANGE.end {
            Some(Band::Bus)
        } else if v >= FLEXGEN_RANGE.start && v < FLEXGEN_RANGE.end {
            Some(Band::Flexgen)
        } else if v >= OBS_RANGE.start && v < OBS_RANGE.end {
            Some(Band::Observer)
        } else {
            None
        }
    }

    /// Final-divider channel index, for clocks of the flexgen band.
    pub const fn channel(self) -> Option<u8> {
        match self.band() {
            Some(Band::Flexgen) => Some((self.0 - FLEXGEN_RANGE.start) as u8),
            _ => None,
        }
    }

    /// Observation output index, for clocks of the observer band.
    pub const fn observer(self) -> Option<u8> {
        match self.band() {
            Some(Band::Observer) => Some((self.0 - OBS_RANGE.start) as u8),
            _ => None,
        }
    }

    /// GFG lane of a PLL output or of a reference-mux output.
    pub fn pll_lane(self) -> Option<&'static PllLane> {
        match self.band()? {
            Band::Pll => PLL_LANES.get((self.0 - PLL_RANGE.start) as usize),
            Band::RefMux => PLL_LANES.get((self.0 - MUXSEL_RANGE.start) as usize),
            _ => None,
        }
    }

    pub fn bus_clock(self) -> Option<&'static BusClock> {
        match self.band()? {
            Band::Bus => BUS_CLOCKS.get((self.0 - BUS_RANGE.start) as usize),
            _ => None,
        }
    }

    /// Position of an oscillator in the oscillator description.
    pub fn oscillator_index(self) -> Option<usize> {
        match self.band()? {
            Band::Oscillator => Some((self.0 - OSC_RANGE.start) as usize),
            _ => None,
        }
    }

    /// Every valid identifier in ascending order.
    pub fn iter() -> impl Iterator<Item = ClockId> {
        (1..Self::LAST.0).map(ClockId)
    }

    /// Every final-divider channel output.
    pub fn flexgen_channels() -> impl Iterator<Item = ClockId> {
        FLEXGEN_RANGE.map(ClockId)
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ch) = self.channel() {
            return write!(f, "flexgen{}", ch);
        }
        match CLOCK_NAMES.iter().find(|(id, _)| id == self) {
            Some((_, name)) => f.write_str(name),
            None if *self == ClockId::NONE => f.write_str("none"),
            None => write!(f, "clk#{}", self.0),
        }
    }
}

impl FromStr for ClockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(ch) = s
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("flexgen"))
            .and_then(|_| s.get(7..))
            .map(|n| n.trim_start_matches('_'))
            .and_then(|n| n.parse::<u16>().ok())
        {
            return ClockId::flexgen(ch).ok_or(Error::InvalidClock);
        }
        CLOCK_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(id, _)| *id)
            .ok_or(Error::InvalidClock)
    }
}

// =============================================================================
// Topology descriptors
// =============================================================================

/// An oscillator and its nominal frequency.
#[derive(Clone, Copy, Debug)]
pub struct OscDesc {
    pub id: ClockId,
    pub nominal: Hertz,
}

/// One GFG lane: reference multiplexer `mux` feeding PLL `id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllLane {
    pub id: ClockId,
    pub mux: ClockId,
    /// Index of the lane's `PLLxCFGR` registers and MUXSEL field.
    pub lane: u8,
    /// Whether the lane can route its reference straight to the output.
    pub has_bypass: bool,
}

/// A bus clock with a fixed parent and a power-of-two divider register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusClock {
    pub id: ClockId,
    pub parent: ClockId,
    pub divr: Reg,
}

/// All oscillators of the tree.
pub fn oscillators() -> &'static [OscDesc] {
    &OSCILLATORS
}

/// All GFG lanes.
pub fn pll_lanes() -> &'static [PllLane] {
    &PLL_LANES
}

/// All bus clocks.
pub fn bus_clocks() -> &'static [BusClock] {
    &BUS_CLOCKS
}

// =============================================================================
// Clock descriptors
// =============================================================================

/// Configuration of one final-divider channel.
///
/// `divider` is `pre × final` with `pre` in {1, 2, 4, 1024} and `final` in
/// 1..=64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    pub id: ClockId,
    pub source: ClockId,
    pub divider: u32,
    pub enabled: bool,
}

impl ClockConfig {
    pub const fn new(id: ClockId, source: ClockId) -> Self {
        Self {
            id,
            source,
            divider: 1,
            enabled: true,
        }
    }

    pub const fn with_divider(mut self, divider: u32) -> Self {
        self.divider = divider;
        self
    }

    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Requested or observed PLL state. Bypass is orthogonal to the enable bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllState {
    Off,
    On,
    /// Output follows the reference; the PLL itself stays disabled.
    Bypass,
    /// PLL enabled and locked, output still on the reference.
    OnBypass,
}

impl PllState {
    pub const fn from_bits(enabled: bool, bypass: bool) -> Self {
        match (enabled, bypass) {
            (false, false) => PllState::Off,
            (true, false) => PllState::On,
            (false, true) => PllState::Bypass,
            (true, true) => PllState::OnBypass,
        }
    }

    pub const fn enables(self) -> bool {
        matches!(self, PllState::On | PllState::OnBypass)
    }

    pub const fn bypasses(self) -> bool {
        matches!(self, PllState::Bypass | PllState::OnBypass)
    }
}

/// Fractional PLL configuration of one GFG lane.
///
/// `postdiv1`/`postdiv2` are 1..=7; both zero disables the post-divider
/// stage (divide by 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    pub id: ClockId,
    pub source: ClockId,
    pub state: PllState,
    pub fractional: bool,
    pub ref_div: u8,
    pub feedback_div: u16,
    /// 24-bit fractional part of the feedback divider.
    pub frac_word: u32,
    pub spread_depth: u8,
    pub spread_freq: u8,
    pub spread_down: bool,
    pub dac_enabled: bool,
    pub postdiv1: u8,
    pub postdiv2: u8,
}

impl PllConfig {
    pub const fn new(id: ClockId, source: ClockId) -> Self {
        Self {
            id,
            source,
            state: PllState::On,
            fractional: false,
            ref_div: 1,
            feedback_div: 1,
            frac_word: 0,
            spread_depth: 0,
            spread_freq: 0,
            spread_down: false,
            dac_enabled: false,
            postdiv1: 0,
            postdiv2: 0,
        }
    }

    pub const fn with_state(mut self, state: PllState) -> Self {
        self.state = state;
        self
    }

    pub const fn with_dividers(mut self, ref_div: u8, feedback_div: u16) -> Self {
        self.ref_div = ref_div;
        self.feedback_div = feedback_div;
        self
    }

    pub const fn with_fraction(mut self, frac_word: u32) -> Self {
        self.fractional = true;
        self.frac_word = frac_word;
        self
    }

    pub const fn with_spread(mut self, depth: u8, freq: u8, down: bool) -> Self {
        self.spread_depth = depth;
        self.spread_freq = freq;
        self.spread_down = down;
        self
    }

    pub const fn with_dac(mut self, enabled: bool) -> Self {
        self.dac_enabled = enabled;
        self
    }

    pub const fn with_postdiv(mut self, postdiv1: u8, postdiv2: u8) -> Self {
        self.postdiv1 = postdiv1;
        self.postdiv2 = postdiv2;
        self
    }

    /// Effective post-divider ratio.
    pub const fn postdiv(&self) -> u32 {
        if self.postdiv1 == 0 && self.postdiv2 == 0 {
            1
        } else {
            let p1 = if self.postdiv1 == 0 { 1 } else { self.postdiv1 as u32 };
            let p2 = if self.postdiv2 == 0 { 1 } else { self.postdiv2 as u32 };
            p1 * p2
        }
    }
}
