//! Flexgen register map and the register-access seam.
//!
//! Registers are named, not addressed: the engine only ever talks to a
//! [`RegisterAccess`] implementation, which is [`Mmio`] on silicon and
//! `sim::SimRegisters` on the host. Field layouts are `tock-registers`
//! bitfields applied to register copies.

use tock_registers::fields::{Field, FieldValue};
use tock_registers::{register_bitfields, LocalRegisterCopy, RegisterLongName};

/// Size in bytes of the flexgen register block.
pub const BLOCK_SIZE: usize = 0x680;

/// Control/status registers of the flexgen block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// Reference multiplexer selection, one 2-bit field per GFG lane.
    MuxSelCfgr,
    /// PLL lane configuration register `PLLxCFGR<n>`, `n` in 1..=7.
    PllCfgr(u8, u8),
    /// Crossbar input selection for one channel.
    XbarCfgr(u8),
    /// Pre-divider of one channel.
    PreDivCfgr(u8),
    /// Pre-divider busy flags, bank 0 for channels 0..32, bank 1 above.
    PreDivSr(u8),
    /// Final divider and enable of one channel.
    FinDivCfgr(u8),
    /// Final-divider busy flags, bank 0 for channels 0..32, bank 1 above.
    FinDivSr(u8),
    LsMcuDivr,
    ApbDivr(u8),
    FcalcCfgr,
    FcalcRefCkSelr,
    FcalcCr1,
    FcalcCr2,
    FcalcSr,
    /// Observation output configuration.
    ObsCfgr(u8),
}

impl Reg {
    /// Byte offset of the register inside the block.
    pub const fn offset(self) -> usize {
        match self {
            Reg::MuxSelCfgr => 0x000,
            Reg::PllCfgr(lane, n) => 0x100 + 0x20 * lane as usize + 4 * (n as usize - 1),
            Reg::XbarCfgr(ch) => 0x200 + 4 * ch as usize,
            Reg::PreDivCfgr(ch) => 0x300 + 4 * ch as usize,
            Reg::PreDivSr(bank) => 0x400 + 4 * bank as usize,
            Reg::FinDivCfgr(ch) => 0x500 + 4 * ch as usize,
            Reg::FinDivSr(bank) => 0x600 + 4 * bank as usize,
            Reg::LsMcuDivr => 0x610,
            Reg::ApbDivr(n) => 0x614 + 4 * n as usize,
            Reg::FcalcCfgr => 0x640,
            Reg::FcalcRefCkSelr => 0x644,
            Reg::FcalcCr1 => 0x648,
            Reg::FcalcCr2 => 0x64C,
            Reg::FcalcSr => 0x650,
            Reg::ObsCfgr(n) => 0x660 + 4 * n as usize,
        }
    }

    /// Word index of the register inside the block.
    pub const fn index(self) -> usize {
        self.offset() / 4
    }
}

register_bitfields![u32,
    /// Reference multiplexer selection, one 2-bit field every 4 bits per lane.
    pub MUXSELCFGR [
        MUXSEL0 OFFSET(0) NUMBITS(2) [],
        MUXSEL1 OFFSET(4) NUMBITS(2) [],
        MUXSEL2 OFFSET(8) NUMBITS(2) [],
        MUXSEL3 OFFSET(12) NUMBITS(2) [],
        MUXSEL4 OFFSET(16) NUMBITS(2) [],
    ],
    pub PLLCFGR1 [
        SSMODRST OFFSET(0) NUMBITS(1) [],
        PLLEN OFFSET(8) NUMBITS(1) [],
        PLLRDY OFFSET(24) NUMBITS(1) [],
        CKREFST OFFSET(26) NUMBITS(1) [],
    ],
    pub PLLCFGR2 [
        FREFDIV OFFSET(0) NUMBITS(6) [],
        FBDIV OFFSET(16) NUMBITS(12) [],
    ],
    pub PLLCFGR3 [
        FRACIN OFFSET(0) NUMBITS(24) [],
        DOWNSPREAD OFFSET(24) NUMBITS(1) [],
        DACEN OFFSET(25) NUMBITS(1) [],
        SSCGDIS OFFSET(26) NUMBITS(1) [],
    ],
    pub PLLCFGR4 [
        DSMEN OFFSET(8) NUMBITS(1) [],
        FOUTPOSTDIVEN OFFSET(9) NUMBITS(1) [],
        BYPASS OFFSET(10) NUMBITS(1) [],
    ],
    pub PLLCFGR5 [
        DIVVAL OFFSET(0) NUMBITS(4) [],
        SPREAD OFFSET(16) NUMBITS(5) [],
    ],
    pub PLLCFGR6 [
        POSTDIV1 OFFSET(0) NUMBITS(3) [],
    ],
    pub PLLCFGR7 [
        POSTDIV2 OFFSET(0) NUMBITS(3) [],
    ],
    pub XBARCFGR [
        SEL OFFSET(0) NUMBITS(4) [],
        /// Switch request / input enable.
        EN OFFSET(6) NUMBITS(1) [],
        /// Switch in progress.
        STS OFFSET(7) NUMBITS(1) [],
    ],
    pub PREDIVCFGR [
        PREDIV OFFSET(0) NUMBITS(10) [],
    ],
    pub FINDIVCFGR [
        FINDIV OFFSET(0) NUMBITS(6) [],
        FINDIVEN OFFSET(6) NUMBITS(1) [],
    ],
    /// `PreDivSr`/`FinDivSr`: one busy bit per channel of the bank.
    pub DIVSR [
        BUSY OFFSET(0) NUMBITS(32) [],
    ],
    pub BUSDIVR [
        DIV OFFSET(0) NUMBITS(3) [],
        RDY OFFSET(31) NUMBITS(1) [],
    ],
    pub FCALCCFGR [
        CKINSEL OFFSET(0) NUMBITS(8) [],
        FCALCCKEN OFFSET(16) NUMBITS(1) [],
        FCALCRSTN OFFSET(17) NUMBITS(1) [],
    ],
    pub FCALCREFCKSELR [
        REFSEL OFFSET(0) NUMBITS(4) [],
    ],
    pub FCALCCR1 [
        RUN OFFSET(0) NUMBITS(1) [],
    ],
    pub FCALCCR2 [
        TWC OFFSET(0) NUMBITS(4) [],
        MD OFFSET(4) NUMBITS(2) [
            Application = 1,
        ],
    ],
    pub FCALCSR [
        FVAL OFFSET(0) NUMBITS(16) [],
        STS OFFSET(16) NUMBITS(1) [],
        OVF OFFSET(17) NUMBITS(1) [],
    ],
    pub OBSCFGR [
        CKINSEL OFFSET(0) NUMBITS(8) [],
        DIV OFFSET(8) NUMBITS(6) [],
        EN OFFSET(16) NUMBITS(1) [],
    ],
];

pub type MuxSelCfgr = LocalRegisterCopy<u32, MUXSELCFGR::Register>;
pub type PllCfgr1 = LocalRegisterCopy<u32, PLLCFGR1::Register>;
pub type PllCfgr2 = LocalRegisterCopy<u32, PLLCFGR2::Register>;
pub type PllCfgr3 = LocalRegisterCopy<u32, PLLCFGR3::Register>;
pub type PllCfgr4 = LocalRegisterCopy<u32, PLLCFGR4::Register>;
pub type PllCfgr5 = LocalRegisterCopy<u32, PLLCFGR5::Register>;
pub type PllCfgr6 = LocalRegisterCopy<u32, PLLCFGR6::Register>;
pub type PllCfgr7 = LocalRegisterCopy<u32, PLLCFGR7::Register>;
pub type XbarCfgr = LocalRegisterCopy<u32, XBARCFGR::Register>;
pub type PreDivCfgr = LocalRegisterCopy<u32, PREDIVCFGR::Register>;
pub type FinDivCfgr = LocalRegisterCopy<u32, FINDIVCFGR::Register>;
pub type DivSr = LocalRegisterCopy<u32, DIVSR::Register>;
pub type BusDivr = LocalRegisterCopy<u32, BUSDIVR::Register>;
pub type FcalcCfgr = LocalRegisterCopy<u32, FCALCCFGR::Register>;
pub type FcalcSr = LocalRegisterCopy<u32, FCALCSR::Register>;
pub type ObsCfgr = LocalRegisterCopy<u32, OBSCFGR::Register>;

/// Reference selection field of GFG lane `lane`.
pub const fn muxsel(lane: u8) -> Field<u32, MUXSELCFGR::Register> {
    Field::<u32, MUXSELCFGR::Register>::new(0b11, 4 * lane as usize)
}

/// Busy-flag bank and bit of a channel in `PreDivSr`/`FinDivSr`.
pub const fn status_bank_bit(channel: u8) -> (u8, Field<u32, DIVSR::Register>) {
    (channel / 32, Field::<u32, DIVSR::Register>::new(1, (channel % 32) as usize))
}

/// Register-level access to the flexgen block.
///
/// The engine assumes it owns the block exclusively for the duration of
/// every call.
pub trait RegisterAccess {
    fn read(&mut self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);

    /// Read `reg` as a field-typed copy.
    fn load<F: RegisterLongName>(&mut self, reg: Reg) -> LocalRegisterCopy<u32, F> {
        LocalRegisterCopy::new(self.read(reg))
    }

    /// Read-modify-write of the fields named in `fields`.
    fn modify<F: RegisterLongName>(&mut self, reg: Reg, fields: FieldValue<u32, F>) {
        let mut copy = self.load::<F>(reg);
        copy.modify(fields);
        self.write(reg, copy.get());
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn read(&mut self, reg: Reg) -> u32 {
        T::read(self, reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        T::write(self, reg, value)
    }
}

/// Memory-mapped flexgen block.
pub struct Mmio {
    base: *mut u32,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the address of a flexgen register block that stays
    /// mapped, and nothing else may access it while this value is alive.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base: base as *mut u32 }
    }
}

impl RegisterAccess for Mmio {
    fn read(&mut self, reg: Reg) -> u32 {
        unsafe { core::ptr::read_volatile(self.base.add(reg.index())) }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        unsafe { core::ptr::write_volatile(self.base.add(reg.index()), value) }
    }
}
