//! Clock topology registry.
//!
//! Each [`Topology`] maps clocks to the code written into the selecting
//! register field: the position of a clock in its table *is* that code.

use super::{Band, ClockId, Error};
use crate::_generated::{OSC_RANGE, PLL_LANES};

pub use crate::_generated::{FCALC_REF_INPUTS, REF_MUX_INPUTS, XBAR_INPUTS};

/// Ordered `ClockId ↔ field code` map of one hardware stage.
#[derive(Debug)]
pub struct Topology {
    entries: &'static [ClockId],
}

impl Topology {
    pub const fn new(entries: &'static [ClockId]) -> Self {
        Self { entries }
    }

    /// Position of `id` in the table (first match).
    pub fn index_of(&self, id: ClockId) -> Option<usize> {
        self.entries.iter().position(|&entry| entry == id)
    }

    /// Field code selecting `id`.
    pub fn code_of(&self, id: ClockId) -> Option<u32> {
        self.index_of(id).map(|index| index as u32)
    }

    /// Clock selected by field code `code`.
    pub fn clock_at(&self, code: u32) -> Option<ClockId> {
        self.entries.get(code as usize).copied()
    }

    pub fn contains(&self, id: ClockId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClockId> + '_ {
        self.entries.iter().copied()
    }
}

// =============================================================================
// Stage-aware input selector
// =============================================================================
//
// Shared by the frequency calculator and the observation outputs:
//   0x00..0x40  final-divider channel outputs
//   0x40..0x60  PLL outputs, by lane
//   0x60..      oscillators, by position in the oscillator description

const SEL_FLEXGEN: u32 = 0x00;
const SEL_PLL: u32 = 0x40;
const SEL_OSC: u32 = 0x60;

/// Selector code of `id` for the measurement/observation input mux.
pub fn input_selector(id: ClockId) -> Result<u32, Error> {
    match id.band() {
        Some(Band::Flexgen) => id.channel().map(|ch| SEL_FLEXGEN + ch as u32).ok_or(Error::InvalidClock),
        Some(Band::Pll) => id.pll_lane().map(|lane| SEL_PLL + lane.lane as u32).ok_or(Error::InvalidClock),
        Some(Band::Oscillator) => id.oscillator_index().map(|i| SEL_OSC + i as u32).ok_or(Error::InvalidClock),
        Some(_) => Err(Error::InvalidSource),
        None => Err(Error::InvalidClock),
    }
}

/// Inverse of [`input_selector`].
pub fn decode_input_selector(code: u32) -> Option<ClockId> {
    let id = if code >= SEL_OSC {
        ClockId(u16::try_from(code - SEL_OSC).ok()?.checked_add(OSC_RANGE.start)?)
    } else if code >= SEL_PLL {
        PLL_LANES.get((code - SEL_PLL) as usize)?.id
    } else {
        ClockId::flexgen((code - SEL_FLEXGEN) as u16)?
    };
    match id.band() {
        Some(Band::Oscillator | Band::Pll | Band::Flexgen) => Some(id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcc::{bus_clocks, oscillators};

    #[test]
    fn index_is_first_match_and_table_order() {
        assert_eq!(REF_MUX_INPUTS.index_of(ClockId::HSI), Some(0));
        assert_eq!(REF_MUX_INPUTS.index_of(ClockId::MSI), Some(2));
        assert_eq!(REF_MUX_INPUTS.index_of(ClockId::LSE), None);
        assert_eq!(XBAR_INPUTS.code_of(ClockId::PLL4), Some(0));
        assert_eq!(XBAR_INPUTS.code_of(ClockId::HSE), Some(6));
        assert_eq!(XBAR_INPUTS.clock_at(6), Some(ClockId::HSE));
        assert_eq!(XBAR_INPUTS.clock_at(15), None);
    }

    #[test]
    fn tables_have_no_duplicates() {
        for table in [&REF_MUX_INPUTS, &XBAR_INPUTS, &FCALC_REF_INPUTS] {
            for (i, id) in table.iter().enumerate() {
                assert_eq!(table.index_of(id), Some(i));
                assert!(id.is_valid());
            }
        }
    }

    #[test]
    fn ref_mux_inputs_are_oscillators() {
        assert!(REF_MUX_INPUTS.iter().all(|id| id.band() == Some(Band::Oscillator)));
        assert!(REF_MUX_INPUTS.len() <= 4);
    }

    #[test]
    fn bus_parents_resolve() {
        for bus in bus_clocks() {
            assert!(bus.parent.is_valid());
            assert!(bus.parent < bus.id || bus.parent.band() == Some(Band::Flexgen));
        }
    }

    #[test]
    fn input_selector_round_trip_by_stage() {
        for id in [ClockId::FLEXGEN_0, ClockId::FLEXGEN_63, ClockId::PLL5, ClockId::LSE] {
            let code = input_selector(id).unwrap();
            assert_eq!(decode_input_selector(code), Some(id));
        }
        for osc in oscillators() {
            assert!(input_selector(osc.id).unwrap() >= SEL_OSC);
        }
        assert_eq!(input_selector(ClockId::MUXSEL0), Err(Error::InvalidSource));
        assert_eq!(input_selector(ClockId::NONE), Err(Error::InvalidClock));
        assert_eq!(decode_input_selector(0x5F), None);
        assert_eq!(decode_input_selector(0xFF), None);
    }
}
