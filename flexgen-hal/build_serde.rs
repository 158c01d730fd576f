use serde::{Deserialize, Serialize};

// ---------- flexgen.yaml ----------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub oscillators: Vec<Oscillator>,
    pub pll_lanes: Vec<PllLane>,
    pub ref_mux_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bus_clocks: Vec<BusClock>,
    pub flexgen_channels: u16,
    pub xbar_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<String>,
    pub fcalc_ref_inputs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub name: String,
    /// Nominal frequency in Hz; 0 for inputs with no fixed rate.
    pub freq: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PllLane {
    pub name: String,
    #[serde(default)]
    pub bypass: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusClock {
    pub name: String,
    pub parent: String,
    /// `Reg` expression of the divider register, e.g. `ApbDivr(0)`.
    pub divider: String,
}
