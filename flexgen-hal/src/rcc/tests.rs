use super::{ClockConfig, ClockId, Config, Error, Flexgen, PllConfig};
use crate::sim::{SimRegisters, SimTicks};
use crate::time::Hertz;

fn flexgen(config: Config) -> Flexgen<SimRegisters, SimTicks> {
    Flexgen::new(SimRegisters::new(), SimTicks::new(), config)
}

/// PLL4 at 480 MHz from a 64 MHz HSE, feeding channel 5.
fn chained() -> Flexgen<SimRegisters, SimTicks> {
    let mut fg = flexgen(Config::new().with_oscillator(ClockId::HSE, Hertz::mhz(64)));
    let pll = PllConfig::new(ClockId::PLL4, ClockId::HSE)
        .with_dividers(2, 30)
        .with_postdiv(2, 1);
    fg.configure_pll(&pll).unwrap();
    fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_5, ClockId::PLL4).with_divider(4))
        .unwrap();
    fg
}

#[test]
fn oscillator_frequency_ignores_tree_state() {
    let mut fg = chained();
    assert_eq!(fg.get_freq(ClockId::HSE), Ok(Hertz::mhz(64)));
    assert_eq!(fg.get_freq(ClockId::LSI), Ok(Hertz::khz(32)));
    assert_eq!(fg.get_freq(ClockId::SPDIF_SYMB), Ok(Hertz(0)));
}

#[test]
fn chained_resolution() {
    let mut fg = chained();
    assert_eq!(fg.get_freq(ClockId::MUXSEL0), Ok(Hertz::mhz(64)));
    assert_eq!(fg.get_freq(ClockId::PLL4), Ok(Hertz::mhz(480)));
    // 64 MHz / 2 × 30 / (2 × 1) / 4
    assert_eq!(fg.get_freq(ClockId::FLEXGEN_5), Ok(Hertz(120_000_000)));
}

#[test]
fn bus_clocks_follow_channel_zero() {
    let mut fg = chained();
    fg.set_config(&ClockConfig::new(ClockId::FLEXGEN_0, ClockId::PLL4).with_divider(2))
        .unwrap();
    fg.set_bus_divider(ClockId::APB1, 4).unwrap();
    assert_eq!(fg.get_freq(ClockId::ICN_LS_MCU), Ok(Hertz::mhz(240)));
    assert_eq!(fg.get_freq(ClockId::APB1), Ok(Hertz::mhz(60)));

    fg.set_bus_divider(ClockId::ICN_LS_MCU, 2).unwrap();
    assert_eq!(fg.get_freq(ClockId::APB1), Ok(Hertz::mhz(30)));
    assert_eq!(fg.get_freq(ClockId::APBDBG), Ok(Hertz::mhz(120)));
}

#[test]
fn observer_tracks_pll_output() {
    let mut fg = chained();
    fg.set_observer(ClockId::OBS1, ClockId::PLL4, 8, true).unwrap();
    assert_eq!(fg.get_source(ClockId::OBS1), Ok(Some(ClockId::PLL4)));
    assert_eq!(fg.get_freq(ClockId::OBS1), Ok(Hertz::mhz(60)));

    fg.set_observer(ClockId::OBS1, ClockId::FLEXGEN_5, 1, true).unwrap();
    assert_eq!(fg.get_freq(ClockId::OBS1), Ok(Hertz::mhz(120)));
}

#[test]
fn pll_retune_is_visible_downstream() {
    let mut fg = chained();
    let pll = PllConfig::new(ClockId::PLL4, ClockId::HSE)
        .with_dividers(2, 25)
        .with_postdiv(2, 1);
    fg.configure_pll(&pll).unwrap();
    assert_eq!(fg.get_freq(ClockId::FLEXGEN_5), Ok(Hertz::mhz(100)));
}

#[test]
fn failed_lock_then_safe_fallback() {
    let mut fg = chained();
    fg.regs().pll_locks = false;
    let pll = PllConfig::new(ClockId::PLL4, ClockId::HSE).with_dividers(1, 40);
    assert_eq!(fg.configure_pll(&pll), Err(Error::Timeout));
    // still bypassed: channel 5 runs from the bare reference
    assert_eq!(fg.get_freq(ClockId::FLEXGEN_5), Ok(Hertz::mhz(16)));

    fg.route_all_to_safe_source().unwrap();
    assert_eq!(fg.get_source(ClockId::FLEXGEN_5), Ok(Some(ClockId::HSI)));
    assert_eq!(fg.get_freq(ClockId::FLEXGEN_5), Ok(Hertz::mhz(16)));
}

#[test]
fn reroute_between_pll_lanes() {
    let mut fg = chained();
    let pll = PllConfig::new(ClockId::PLL5, ClockId::HSE).with_dividers(1, 15);
    fg.configure_pll(&pll).unwrap();
    assert_eq!(fg.get_freq(ClockId::PLL5), Ok(Hertz::mhz(960)));

    assert_eq!(fg.reroute_children(ClockId::PLL4, ClockId::PLL5), Ok(1));
    assert_eq!(fg.get_source(ClockId::FLEXGEN_5), Ok(Some(ClockId::PLL5)));
    assert_eq!(fg.get_div(5), Ok(8));
    assert_eq!(fg.get_freq(ClockId::FLEXGEN_5), Ok(Hertz(120_000_000)));
}

#[test]
fn config_readback_of_untouched_channel() {
    let mut fg = flexgen(Config::new());
    assert_eq!(
        fg.get_config(ClockId::FLEXGEN_63),
        Ok(ClockConfig {
            id: ClockId::FLEXGEN_63,
            source: ClockId::PLL4,
            divider: 1,
            enabled: false,
        })
    );
    assert_eq!(fg.get_config(ClockId::OBS0), Err(Error::InvalidClock));
}
