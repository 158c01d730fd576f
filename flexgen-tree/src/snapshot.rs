//! Register snapshots.
//!
//! A snapshot is an hjson document with optional oscillator overrides and a
//! map of register name to value:
//!
//! ```hjson
//! {
//!   oscillators: { hse: 24000000 }
//!   registers: {
//!     muxselcfgr: 1
//!     pll0cfgr2: "0x320001"
//!     xbar5cfgr: "0x40"
//!     findiv5cfgr: "0x43"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use flexgen_hal::rcc::{ClockId, Config};
use flexgen_hal::regs::Reg;
use flexgen_hal::sim::SimRegisters;
use flexgen_hal::time::Hertz;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(u64),
    Text(String),
}

impl Value {
    fn to_u32(&self) -> Result<u32> {
        let value = match self {
            Value::Number(n) => *n,
            Value::Text(s) => {
                let s = s.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
                    None => s.replace('_', "").parse::<u64>(),
                }
                .with_context(|| format!("invalid number {:?}", s))?
            }
        };
        u32::try_from(value).map_err(|_| anyhow!("{:#x} does not fit a register", value))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub oscillators: BTreeMap<String, u64>,
    #[serde(default)]
    pub registers: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_hjson::from_str(content)?)
    }

    /// Engine configuration with this snapshot's oscillator overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::new();
        for (name, freq) in &self.oscillators {
            let id: ClockId = name.parse().map_err(|_| anyhow!("unknown oscillator {:?}", name))?;
            if config.oscillator_freq(id).is_none() {
                bail!("{} is not an oscillator", id);
            }
            config = config.with_oscillator(id, Hertz(*freq));
        }
        Ok(config)
    }

    /// Simulated register block holding this snapshot's values.
    pub fn registers(&self) -> Result<SimRegisters> {
        let mut regs = SimRegisters::new();
        for (name, value) in &self.registers {
            let reg = parse_reg(name)?;
            let value = value.to_u32().with_context(|| format!("register {}", name))?;
            log::trace!("{} ({:?}) = {:#010x}", name, reg, value);
            regs.poke(reg, value);
        }
        Ok(regs)
    }
}

/// Split `name` into `prefix<index>suffix`.
fn indexed(name: &str, prefix: &str, suffix: &str) -> Option<u8> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()
}

/// Parse a register name such as `xbar12cfgr`, `pll0cfgr3` or `apb2divr`.
pub fn parse_reg(name: &str) -> Result<Reg> {
    let lower = name.to_ascii_lowercase();
    let n = lower.as_str();

    let reg = match n {
        "muxselcfgr" => Reg::MuxSelCfgr,
        "lsmcudivr" => Reg::LsMcuDivr,
        "fcalccfgr" => Reg::FcalcCfgr,
        "fcalcrefckselr" => Reg::FcalcRefCkSelr,
        "fcalccr1" => Reg::FcalcCr1,
        "fcalccr2" => Reg::FcalcCr2,
        _ => {
            if let Some(ch) = indexed(n, "xbar", "cfgr") {
                Reg::XbarCfgr(ch)
            } else if let Some(ch) = indexed(n, "prediv", "cfgr") {
                Reg::PreDivCfgr(ch)
            } else if let Some(ch) = indexed(n, "findiv", "cfgr") {
                Reg::FinDivCfgr(ch)
            } else if let Some(i) = indexed(n, "apb", "divr") {
                Reg::ApbDivr(i)
            } else if let Some(i) = indexed(n, "obs", "cfgr") {
                Reg::ObsCfgr(i)
            } else if let Some((lane, cfgr)) = n
                .strip_prefix("pll")
                .and_then(|rest| rest.split_once("cfgr"))
                .and_then(|(lane, cfgr)| Some((lane.parse::<u8>().ok()?, cfgr.parse::<u8>().ok()?)))
            {
                if !(1..=7).contains(&cfgr) {
                    bail!("{}: PLL lanes have cfgr1..cfgr7", name);
                }
                Reg::PllCfgr(lane, cfgr)
            } else {
                bail!("unknown register {:?}", name);
            }
        }
    };

    check_bounds(name, reg)?;
    Ok(reg)
}

fn check_bounds(name: &str, reg: Reg) -> Result<()> {
    use flexgen_hal::rcc::{bus_clocks, FLEXGEN_CHANNELS, OBSERVER_COUNT, PLL_LANE_COUNT};

    let ok = match reg {
        Reg::XbarCfgr(ch) | Reg::PreDivCfgr(ch) | Reg::FinDivCfgr(ch) => (ch as u16) < FLEXGEN_CHANNELS,
        Reg::PllCfgr(lane, _) => (lane as usize) < PLL_LANE_COUNT,
        Reg::ObsCfgr(n) => (n as usize) < OBSERVER_COUNT,
        Reg::ApbDivr(_) => bus_clocks().iter().any(|bus| bus.divr == reg),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        bail!("register {} does not exist on this block", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexgen_hal::regs::RegisterAccess;

    const SNAPSHOT: &str = r#"
    {
      # board crystal
      oscillators: { hse: 24000000 }
      registers: {
        muxselcfgr: 1
        pll0cfgr2: "0x320001"
        xbar5cfgr: "0x40"
        findiv5cfgr: "0x43"
      }
    }
    "#;

    #[test]
    fn register_names() {
        assert_eq!(parse_reg("XBAR12CFGR").unwrap(), Reg::XbarCfgr(12));
        assert_eq!(parse_reg("pll4cfgr7").unwrap(), Reg::PllCfgr(4, 7));
        assert_eq!(parse_reg("apb4divr").unwrap(), Reg::ApbDivr(4));
        assert_eq!(parse_reg("obs1cfgr").unwrap(), Reg::ObsCfgr(1));
        assert!(parse_reg("pll0cfgr8").is_err());
        assert!(parse_reg("pll5cfgr1").is_err());
        assert!(parse_reg("xbar64cfgr").is_err());
        assert!(parse_reg("apb5divr").is_err());
        assert!(parse_reg("fcalcsr").is_err());
    }

    #[test]
    fn values() {
        assert_eq!(Value::Number(7).to_u32().unwrap(), 7);
        assert_eq!(Value::Text("0x1_0000".into()).to_u32().unwrap(), 0x1_0000);
        assert_eq!(Value::Text("42".into()).to_u32().unwrap(), 42);
        assert!(Value::Number(1 << 32).to_u32().is_err());
        assert!(Value::Text("0xZZ".into()).to_u32().is_err());
    }

    #[test]
    fn loads_into_simulator() {
        let snapshot = Snapshot::parse(SNAPSHOT).unwrap();
        let config = snapshot.config().unwrap();
        assert_eq!(config.oscillator_freq(ClockId::HSE), Some(Hertz::mhz(24)));

        let mut regs = snapshot.registers().unwrap();
        assert_eq!(regs.read(Reg::XbarCfgr(5)), 0x40);
        assert_eq!(regs.read(Reg::PllCfgr(0, 2)), 0x32_0001);
        assert_eq!(regs.write_count(), 0);
    }

    #[test]
    fn rejects_bad_oscillators() {
        let snapshot = Snapshot::parse("{ oscillators: { pll4: 1 } }").unwrap();
        assert!(snapshot.config().is_err());
        let snapshot = Snapshot::parse("{ oscillators: { nope: 1 } }").unwrap();
        assert!(snapshot.config().is_err());
    }
}
