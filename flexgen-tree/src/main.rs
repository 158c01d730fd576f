use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use flexgen_hal::rcc::{compute_divider, round_up_divider, Band, ClockId, PllState};
use flexgen_hal::regs::{ObsCfgr, Reg, RegisterAccess, OBSCFGR};
use flexgen_hal::sim::{SimRegisters, SimTicks};
use flexgen_hal::time::TickSource;
use flexgen_hal::Flexgen;

mod snapshot;
use snapshot::Snapshot;

#[derive(Parser)]
#[command(name = "flexgen-tree")]
#[command(about = "Inspect and exercise a flexgen clock tree from a register snapshot")]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print source and frequency of every clock in a snapshot
    Show {
        snapshot: PathBuf,
        /// Include disabled final-divider channels
        #[arg(short, long)]
        all: bool,
    },
    /// Factor a total divider into pre-divider and final divider
    Divider { total: u32 },
    /// Move every enabled child of one clock to another and print the result
    Reroute {
        snapshot: PathBuf,
        #[arg(long, value_parser = parse_clock)]
        from: ClockId,
        #[arg(long, value_parser = parse_clock)]
        to: ClockId,
    },
}

fn parse_clock(s: &str) -> Result<ClockId, String> {
    s.parse().map_err(|_| format!("unknown clock {:?}", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Commands::Show { snapshot, all } => {
            let snapshot = Snapshot::load(&snapshot)?;
            let mut flexgen = Flexgen::new(snapshot.registers()?, SimTicks::new(), snapshot.config()?);
            print_tree(&mut flexgen, all)?;
        }
        Commands::Divider { total } => {
            let setting = compute_divider(total).map_err(|e| anyhow!("divider {}: {}", total, e))?;
            println!(
                "{} = prediv {} x findiv {} (codes {:#x}, {})",
                setting.total(),
                setting.pre,
                setting.fin,
                setting.pre_code(),
                setting.fin_code()
            );
            if setting.total() != total {
                let up = round_up_divider(total).map_err(|e| anyhow!("divider {}: {}", total, e))?;
                println!("{} is not representable, nearest safe divider is {}", total, up);
            }
        }
        Commands::Reroute { snapshot, from, to } => {
            let snapshot = Snapshot::load(&snapshot)?;
            let mut flexgen = Flexgen::new(snapshot.registers()?, SimTicks::new(), snapshot.config()?);
            let moved = flexgen
                .reroute_children(from, to)
                .map_err(|e| anyhow!("rerouting {} to {}: {}", from, to, e))?;
            println!("moved {} channel(s) from {} to {}", moved, from, to);
            print_tree(&mut flexgen, false)?;
        }
    }

    Ok(())
}

fn print_tree<T: TickSource>(flexgen: &mut Flexgen<SimRegisters, T>, all: bool) -> Result<()> {
    println!("{:<12} {:<12} {:>14}  detail", "clock", "source", "frequency");

    for id in ClockId::iter() {
        let detail = match id.band() {
            Some(Band::Flexgen) => {
                let Some(channel) = id.channel() else { continue };
                let enabled = flexgen.channel_enabled(channel).map_err(|e| anyhow!("{}: {}", id, e))?;
                if !enabled && !all {
                    continue;
                }
                let div = flexgen.get_div(channel).map_err(|e| anyhow!("{}: {}", id, e))?;
                format!("div {}{}", div, if enabled { "" } else { ", disabled" })
            }
            Some(Band::Pll) => match flexgen.get_pll_config(id) {
                Ok(pll) => match pll.state {
                    PllState::Off => "off".to_string(),
                    PllState::Bypass | PllState::OnBypass => "bypass".to_string(),
                    PllState::On => format!(
                        "refdiv {} fbdiv {}{} postdiv {}",
                        pll.ref_div,
                        pll.feedback_div,
                        if pll.fractional { format!(" frac {:#08x}", pll.frac_word) } else { String::new() },
                        pll.postdiv()
                    ),
                },
                Err(e) => format!("unreadable: {}", e),
            },
            Some(Band::Bus) => match flexgen.get_bus_divider(id) {
                Ok(div) => format!("div {}", div),
                Err(e) => format!("unreadable: {}", e),
            },
            Some(Band::Observer) => {
                let n = id.observer().unwrap_or_default();
                let cfgr: ObsCfgr = flexgen.regs().load(Reg::ObsCfgr(n));
                if !cfgr.is_set(OBSCFGR::EN) && !all {
                    continue;
                }
                String::new()
            }
            _ => String::new(),
        };

        let source = match flexgen.get_source(id) {
            Ok(Some(src)) => src.to_string(),
            Ok(None) => "-".to_string(),
            Err(e) => format!("<{}>", e),
        };
        let freq = match flexgen.get_freq(id) {
            Ok(freq) => freq.0.to_string(),
            Err(e) => format!("<{}>", e),
        };
        println!("{:<12} {:<12} {:>14}  {}", id.to_string(), source, freq, detail);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexgen_hal::time::Hertz;

    const SNAPSHOT: &str = r#"
    {
      oscillators: { hse: 24000000 }
      registers: {
        # PLL5 from HSE: 24 MHz × 25 = 600 MHz
        muxselcfgr: "0x10"
        pll1cfgr1: "0x100"
        pll1cfgr2: "0x190001"
        # channel 3 on PLL5, divided by 4, enabled
        xbar3cfgr: "0x41"
        findiv3cfgr: "0x43"
      }
    }
    "#;

    fn flexgen() -> Flexgen<SimRegisters, SimTicks> {
        let snapshot = Snapshot::parse(SNAPSHOT).unwrap();
        Flexgen::new(snapshot.registers().unwrap(), SimTicks::new(), snapshot.config().unwrap())
    }

    #[test]
    fn snapshot_resolves() {
        let mut fg = flexgen();
        assert_eq!(fg.get_source(ClockId::FLEXGEN_3), Ok(Some(ClockId::PLL5)));
        assert_eq!(fg.get_freq(ClockId::PLL5), Ok(Hertz::mhz(600)));
        assert_eq!(fg.get_freq(ClockId::FLEXGEN_3), Ok(Hertz::mhz(150)));
        print_tree(&mut fg, true).unwrap();
    }

    #[test]
    fn reroute_from_snapshot() {
        let mut fg = flexgen();
        assert_eq!(fg.reroute_children(ClockId::PLL5, ClockId::HSE), Ok(1));
        assert_eq!(fg.get_freq(ClockId::FLEXGEN_3), Ok(Hertz::mhz(6)));
    }

    #[test]
    fn clock_argument() {
        assert_eq!(parse_clock("pll5"), Ok(ClockId::PLL5));
        assert_eq!(parse_clock("flexgen_3"), Ok(ClockId::FLEXGEN_3));
        assert!(parse_clock("pll9").is_err());
    }

    #[test]
    fn cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
