use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use proc_macro2::TokenStream;
use quote::format_ident;
use quote::quote;

mod build_serde;
use build_serde::Topology;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=data/flexgen.yaml");
    println!("cargo:rerun-if-changed=build_serde.rs");

    let topology_path = Path::new("data").join("flexgen.yaml");
    let topology_content = fs::read_to_string(&topology_path)
        .map_err(|e| format!("Failed to read flexgen.yaml: {}", e))?;
    let topology: Topology = serde_yaml::from_str(&topology_content)
        .map_err(|e| format!("Failed to parse flexgen.yaml: {}", e))?;

    let ids = ClockNumbering::new(&topology);

    let mut token_stream = TokenStream::new();

    token_stream.extend(quote! {
        use crate::rcc::{BusClock, ClockId, OscDesc, PllLane, Topology};
        use crate::regs::Reg;
        use crate::time::Hertz;
    });

    token_stream.extend(generate_clock_ids(&ids));
    token_stream.extend(generate_bands(&ids, &topology));
    token_stream.extend(generate_descriptors(&ids, &topology)?);
    token_stream.extend(generate_tables(&ids, &topology)?);

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dest_path = out_dir.join("_generated.rs");
    let mut file = File::create(&dest_path).unwrap();
    write!(file, "{}", token_stream).unwrap();
    rustfmt(&dest_path);

    Ok(())
}

/// Numeric identifiers, assigned band by band in declaration order.
///
/// Band order: oscillators, reference-mux outputs, PLL outputs, bus clocks,
/// final-divider channels, observation outputs.
struct ClockNumbering {
    by_name: BTreeMap<String, u16>,
    named: Vec<(String, u16)>,
    bands: Vec<(&'static str, u16, u16)>,
    last: u16,
}

impl ClockNumbering {
    fn new(topology: &Topology) -> Self {
        let mut numbering = ClockNumbering {
            by_name: BTreeMap::new(),
            named: Vec::new(),
            bands: Vec::new(),
            last: 0,
        };
        let mut next: u16 = 1;

        let oscillators: Vec<String> = topology.oscillators.iter().map(|o| o.name.clone()).collect();
        numbering.band("OSC", &oscillators, &mut next, true);

        let muxes: Vec<String> = (0..topology.pll_lanes.len()).map(|n| format!("MUXSEL{}", n)).collect();
        numbering.band("MUXSEL", &muxes, &mut next, true);

        let plls: Vec<String> = topology.pll_lanes.iter().map(|p| p.name.clone()).collect();
        numbering.band("PLL", &plls, &mut next, true);

        let buses: Vec<String> = topology.bus_clocks.iter().map(|b| b.name.clone()).collect();
        numbering.band("BUS", &buses, &mut next, true);

        let channels: Vec<String> = (0..topology.flexgen_channels).map(|n| format!("FLEXGEN_{}", n)).collect();
        numbering.band("FLEXGEN", &channels, &mut next, false);

        numbering.band("OBS", &topology.observers, &mut next, true);

        numbering.last = next;
        numbering
    }

    fn band(&mut self, band: &'static str, names: &[String], next: &mut u16, display: bool) {
        let first = *next;
        for name in names {
            if self.by_name.insert(name.clone(), *next).is_some() {
                panic!("clock {} declared twice in flexgen.yaml", name);
            }
            if display {
                self.named.push((name.clone(), *next));
            }
            *next += 1;
        }
        self.bands.push((band, first, *next));
    }

    fn get(&self, name: &str) -> u16 {
        match self.by_name.get(name) {
            Some(id) => *id,
            None => panic!("unknown clock {} referenced in flexgen.yaml", name),
        }
    }
}

fn generate_clock_ids(ids: &ClockNumbering) -> TokenStream {
    let mut consts = TokenStream::new();
    for (name, id) in &ids.by_name {
        let ident = format_ident!("{}", name);
        consts.extend(quote! {
            pub const #ident: ClockId = ClockId(#id);
        });
    }
    let last = ids.last;

    quote! {
        impl ClockId {
            /// Sentinel "no clock".
            pub const NONE: ClockId = ClockId(0);
            #consts
            /// One past the highest valid identifier.
            pub const LAST: ClockId = ClockId(#last);
        }
    }
}

fn generate_bands(ids: &ClockNumbering, topology: &Topology) -> TokenStream {
    let mut tokens = TokenStream::new();
    for (band, first, end) in &ids.bands {
        let ident = format_ident!("{}_RANGE", band);
        tokens.extend(quote! {
            pub(crate) const #ident: core::ops::Range<u16> = #first..#end;
        });
    }
    let channels = topology.flexgen_channels;
    let lanes = topology.pll_lanes.len();
    let observers = topology.observers.len();
    tokens.extend(quote! {
        /// Number of final-divider channels behind the crossbar.
        pub const FLEXGEN_CHANNELS: u16 = #channels;
        /// Number of GFG lanes (reference mux + PLL pairs).
        pub const PLL_LANE_COUNT: usize = #lanes;
        /// Number of observation outputs.
        pub const OBSERVER_COUNT: usize = #observers;
    });
    tokens
}

fn generate_descriptors(
    ids: &ClockNumbering,
    topology: &Topology,
) -> Result<TokenStream, Box<dyn std::error::Error>> {
    let osc_count = topology.oscillators.len();
    let oscillators = topology.oscillators.iter().map(|osc| {
        let ident = format_ident!("{}", osc.name);
        let freq = osc.freq;
        quote! { OscDesc { id: ClockId::#ident, nominal: Hertz(#freq) } }
    });

    let lanes = topology.pll_lanes.iter().enumerate().map(|(n, lane)| {
        let ident = format_ident!("{}", lane.name);
        let mux = format_ident!("MUXSEL{}", n);
        let bypass = lane.bypass;
        let index = n as u8;
        quote! { PllLane { id: ClockId::#ident, mux: ClockId::#mux, lane: #index, has_bypass: #bypass } }
    });

    let mut buses = Vec::new();
    for bus in &topology.bus_clocks {
        ids.get(&bus.parent);
        let ident = format_ident!("{}", bus.name);
        let parent = format_ident!("{}", bus.parent);
        let divider = TokenStream::from_str(&bus.divider)
            .map_err(|e| format!("bad divider register {} for {}: {}", bus.divider, bus.name, e))?;
        buses.push(quote! { BusClock { id: ClockId::#ident, parent: ClockId::#parent, divr: Reg::#divider } });
    }
    let bus_count = buses.len();

    let names = ids.named.iter().map(|(name, id)| {
        let lower = name.to_ascii_lowercase();
        quote! { (ClockId(#id), #lower) }
    });
    let name_count = ids.named.len();

    Ok(quote! {
        pub(crate) const OSC_COUNT: usize = #osc_count;
        pub(crate) const OSCILLATORS: [OscDesc; OSC_COUNT] = [#(#oscillators),*];
        pub(crate) static PLL_LANES: [PllLane; PLL_LANE_COUNT] = [#(#lanes),*];
        pub(crate) static BUS_CLOCKS: [BusClock; #bus_count] = [#(#buses),*];
        pub(crate) static CLOCK_NAMES: [(ClockId, &str); #name_count] = [#(#names),*];
    })
}

fn generate_tables(
    ids: &ClockNumbering,
    topology: &Topology,
) -> Result<TokenStream, Box<dyn std::error::Error>> {
    let mut tokens = TokenStream::new();
    let tables = [
        ("REF_MUX_INPUTS", "reference multiplexer inputs (MUXSELCFGR codes)", &topology.ref_mux_inputs, 4),
        ("XBAR_INPUTS", "crossbar inputs (XBARxCFGR.SEL codes)", &topology.xbar_inputs, 16),
        ("FCALC_REF_INPUTS", "frequency-calculator references (FCALCREFCKSELR codes)", &topology.fcalc_ref_inputs, 16),
    ];

    for (name, doc, entries, capacity) in tables {
        if entries.len() > capacity {
            return Err(format!("{} has {} entries, field holds {}", name, entries.len(), capacity).into());
        }
        let mut seen = BTreeMap::new();
        for entry in entries.iter() {
            if seen.insert(entry.clone(), ()).is_some() {
                return Err(format!("{} lists {} twice", name, entry).into());
            }
        }
        let ident = format_ident!("{}", name);
        let clocks = entries.iter().map(|entry| {
            let id = ids.get(entry);
            quote! { ClockId(#id) }
        });
        let doc = format!("Topology table: {}.", doc);
        tokens.extend(quote! {
            #[doc = #doc]
            pub static #ident: Topology = Topology::new(&[#(#clocks),*]);
        });
    }
    Ok(tokens)
}

/// rustfmt a given path.
/// Failures are logged to stderr and ignored.
fn rustfmt(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match Command::new("rustfmt").args([path]).output() {
        Err(e) => {
            eprintln!("failed to exec rustfmt {:?}: {:?}", path, e);
        }
        Ok(out) => {
            if !out.status.success() {
                eprintln!("rustfmt {:?} failed:", path);
                eprintln!("=== STDOUT:");
                std::io::stderr().write_all(&out.stdout).unwrap();
                eprintln!("=== STDERR:");
                std::io::stderr().write_all(&out.stderr).unwrap();
            }
        }
    }
}
