//! Simulated flexgen register block and tick source.
//!
//! Status bits are computed when read: crossbar and divider busy flags follow
//! a programmable [`BusyMode`], PLL lock follows the enable bit (unless told
//! to stick), bus dividers are always ready, and starting the frequency
//! calculator latches a result from [`FcalcModel`].

use crate::rcc::FLEXGEN_CHANNELS;
use crate::regs::{
    DivSr, FcalcCfgr, FcalcSr, PllCfgr1, Reg, RegisterAccess, XbarCfgr, BLOCK_SIZE, BUSDIVR, DIVSR, FCALCCFGR, FCALCCR1,
    FCALCCR2, FCALCREFCKSELR, FCALCSR, PLLCFGR1, XBARCFGR,
};
use crate::time::TickSource;

const WORDS: usize = BLOCK_SIZE / 4;
const FOREVER: u32 = u32::MAX;

/// Busy-flag behaviour of a class of guarded registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BusyMode {
    /// Never busy.
    #[default]
    Idle,
    /// Always busy, before and after any write.
    Stuck,
    /// Idle until written, then busy forever.
    StuckAfterWrite,
    /// After a write, busy for this many reads of the flag.
    ClearsAfter(u32),
}

impl BusyMode {
    fn after_write(self) -> u32 {
        match self {
            BusyMode::Idle | BusyMode::Stuck => 0,
            BusyMode::StuckAfterWrite => FOREVER,
            BusyMode::ClearsAfter(n) => n,
        }
    }
}

/// Behaviour of the frequency calculator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FcalcModel {
    /// Raw count reported by every run that does not overflow.
    pub count: u16,
    /// Window codes above this overflow.
    pub overflow_above: u8,
    /// Runs never complete.
    pub hang: bool,
    /// A latched result survives stopping the calculator.
    pub status_sticks: bool,
    /// Number of runs started.
    pub runs: u32,
    /// Input selector of the last run.
    pub input: u32,
    /// Reference code of the last run.
    pub reference: u32,
}

impl Default for FcalcModel {
    fn default() -> Self {
        Self {
            count: 0,
            overflow_above: 15,
            hang: false,
            status_sticks: false,
            runs: 0,
            input: 0,
            reference: 0,
        }
    }
}

/// Word-addressed flexgen block.
pub struct SimRegisters {
    words: [u32; WORDS],
    pending: [u32; WORDS],
    writes: usize,
    pub xbar_busy: BusyMode,
    pub div_busy: BusyMode,
    /// Whether an enabled PLL reports lock.
    pub pll_locks: bool,
    /// Whether a locked PLL drops its ready flag when disabled.
    pub pll_unlocks: bool,
    pub fcalc: FcalcModel,
}

impl Default for SimRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRegisters {
    /// All registers zero: every channel on crossbar input 0, divider 1, disabled.
    pub fn new() -> Self {
        Self {
            words: [0; WORDS],
            pending: [0; WORDS],
            writes: 0,
            xbar_busy: BusyMode::Idle,
            div_busy: BusyMode::Idle,
            pll_locks: true,
            pll_unlocks: true,
            fcalc: FcalcModel::default(),
        }
    }

    /// Stored value, without computed status bits.
    pub fn peek(&self, reg: Reg) -> u32 {
        self.words[reg.index()]
    }

    /// Store a value without side effects and without counting a write.
    pub fn poke(&mut self, reg: Reg, value: u32) {
        self.words[reg.index()] = value;
    }

    /// Number of writes through [`RegisterAccess`].
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn busy(&mut self, mode: BusyMode, index: usize) -> bool {
        match mode {
            BusyMode::Idle => false,
            BusyMode::Stuck => true,
            BusyMode::StuckAfterWrite | BusyMode::ClearsAfter(_) => match self.pending[index] {
                0 => false,
                FOREVER => true,
                n => {
                    self.pending[index] = n - 1;
                    true
                }
            },
        }
    }

    fn div_status(&mut self, bank: u8, cfgr: fn(u8) -> Reg) -> u32 {
        let mut busy = 0;
        for bit in 0..32u16 {
            let channel = bank as u16 * 32 + bit;
            if channel >= FLEXGEN_CHANNELS {
                break;
            }
            if self.busy(self.div_busy, cfgr(channel as u8).index()) {
                busy |= 1 << bit;
            }
        }
        let mut status = DivSr::new(0);
        status.write(DIVSR::BUSY.val(busy));
        status.get()
    }

    fn pll_ready(&self, index: usize, cfgr1: PllCfgr1) -> bool {
        if cfgr1.is_set(PLLCFGR1::PLLEN) {
            self.pll_locks
        } else {
            self.pending[index] != 0
        }
    }

    fn fcalc_start(&mut self) {
        let cfgr = FcalcCfgr::new(self.peek(Reg::FcalcCfgr));
        let window = FCALCCR2::TWC.read(self.peek(Reg::FcalcCr2));
        let reference = FCALCREFCKSELR::REFSEL.read(self.peek(Reg::FcalcRefCkSelr));
        let model = &mut self.fcalc;
        model.runs += 1;
        model.input = cfgr.read(FCALCCFGR::CKINSEL);
        model.reference = reference;

        let mut status = FcalcSr::new(0);
        if !model.hang {
            if window > model.overflow_above as u32 {
                status.write(FCALCSR::STS::SET + FCALCSR::OVF::SET);
            } else {
                status.write(FCALCSR::STS::SET + FCALCSR::FVAL.val(model.count as u32));
            }
        }
        self.poke(Reg::FcalcSr, status.get());
    }

    fn fcalc_stop(&mut self) {
        if !self.fcalc.status_sticks {
            self.poke(Reg::FcalcSr, 0);
        }
    }
}

impl RegisterAccess for SimRegisters {
    fn read(&mut self, reg: Reg) -> u32 {
        let index = reg.index();
        let word = self.words[index];
        match reg {
            Reg::XbarCfgr(_) => {
                let busy = self.busy(self.xbar_busy, index);
                XBARCFGR::STS.val(busy as u32).modify(word)
            }
            Reg::PreDivSr(bank) => self.div_status(bank, Reg::PreDivCfgr),
            Reg::FinDivSr(bank) => self.div_status(bank, Reg::FinDivCfgr),
            Reg::PllCfgr(_, 1) => {
                let ready = self.pll_ready(index, PllCfgr1::new(word));
                PLLCFGR1::PLLRDY.val(ready as u32).modify(word)
            }
            Reg::LsMcuDivr | Reg::ApbDivr(_) => BUSDIVR::RDY::SET.modify(word),
            _ => word,
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.writes += 1;
        let index = reg.index();
        match reg {
            Reg::XbarCfgr(_) => {
                let mut cfgr = XbarCfgr::new(value);
                cfgr.modify(XBARCFGR::STS::CLEAR);
                self.words[index] = cfgr.get();
                self.pending[index] = self.xbar_busy.after_write();
            }
            Reg::PreDivCfgr(_) | Reg::FinDivCfgr(_) => {
                self.words[index] = value;
                self.pending[index] = self.div_busy.after_write();
            }
            Reg::PllCfgr(_, 1) => {
                let was_ready = self.pll_ready(index, PllCfgr1::new(self.words[index]));
                self.pending[index] = (was_ready && !self.pll_unlocks) as u32;
                self.words[index] = PLLCFGR1::PLLRDY::CLEAR.modify(value);
            }
            Reg::LsMcuDivr | Reg::ApbDivr(_) => self.words[index] = BUSDIVR::RDY::CLEAR.modify(value),
            Reg::FcalcCr1 => {
                self.words[index] = value;
                if FCALCCR1::RUN.is_set(value) {
                    self.fcalc_start();
                } else {
                    self.fcalc_stop();
                }
            }
            Reg::FcalcCfgr => {
                self.words[index] = value;
                if !FCALCCFGR::FCALCCKEN.is_set(value) {
                    self.fcalc_stop();
                }
            }
            Reg::PreDivSr(_) | Reg::FinDivSr(_) | Reg::FcalcSr => {}
            _ => self.words[index] = value,
        }
    }
}

/// Tick source that advances one millisecond per read.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimTicks {
    now: u64,
}

impl SimTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds elapsed, i.e. number of reads so far.
    pub fn elapsed_ms(&self) -> u64 {
        self.now
    }
}

impl TickSource for SimTicks {
    fn now_ms(&mut self) -> u64 {
        let now = self.now;
        self.now += 1;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::status_bank_bit;

    #[test]
    fn status_bits_are_computed_on_read() {
        let mut regs = SimRegisters::new();
        regs.write(Reg::PllCfgr(2, 1), PLLCFGR1::PLLEN::SET.into());
        assert!(PLLCFGR1::PLLRDY.is_set(regs.read(Reg::PllCfgr(2, 1))));
        assert!(!PLLCFGR1::PLLRDY.is_set(regs.peek(Reg::PllCfgr(2, 1))));
        assert!(BUSDIVR::RDY.is_set(regs.read(Reg::ApbDivr(3))));
    }

    #[test]
    fn pll_lock_can_outlive_disable() {
        let mut regs = SimRegisters::new();
        regs.pll_unlocks = false;
        regs.write(Reg::PllCfgr(0, 1), PLLCFGR1::PLLEN::SET.into());
        regs.write(Reg::PllCfgr(0, 1), 0);
        assert!(PLLCFGR1::PLLRDY.is_set(regs.read(Reg::PllCfgr(0, 1))));

        // never locked, so nothing to hold on to
        regs.write(Reg::PllCfgr(1, 1), 0);
        assert!(!PLLCFGR1::PLLRDY.is_set(regs.read(Reg::PllCfgr(1, 1))));
    }

    #[test]
    fn divider_busy_lands_in_the_channel_bank() {
        let mut regs = SimRegisters::new();
        regs.div_busy = BusyMode::ClearsAfter(1);
        regs.write(Reg::FinDivCfgr(40), 3);

        let (bank, bit) = status_bank_bit(40);
        assert_eq!(bank, 1);
        assert!(bit.is_set(regs.read(Reg::FinDivSr(bank))));
        assert!(!bit.is_set(regs.read(Reg::FinDivSr(bank))));
        assert_eq!(regs.read(Reg::FinDivSr(0)), 0);
        assert_eq!(regs.read(Reg::PreDivSr(1)), 0);
    }

    #[test]
    fn status_registers_ignore_writes() {
        let mut regs = SimRegisters::new();
        regs.write(Reg::FcalcSr, 0xFFFF);
        assert_eq!(regs.read(Reg::FcalcSr), 0);
        assert_eq!(regs.write_count(), 1);
    }
}
