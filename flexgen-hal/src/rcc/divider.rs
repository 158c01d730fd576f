//! Pre/final divider pair of a final-divider channel.

use super::transaction::{GuardedWrite, Transaction};
use super::{Error, Flexgen};
use crate::regs::{status_bank_bit, FinDivCfgr, PreDivCfgr, Reg, RegisterAccess, FINDIVCFGR, PREDIVCFGR};
use crate::time::TickSource;

/// Pre-divider ratios, in preference order.
pub const PREDIV_RATIOS: [u32; 4] = [1, 2, 4, 1024];
/// Largest final-divider ratio.
pub const FINDIV_MAX: u32 = 64;
/// Largest total divider of a channel.
pub const MAX_DIVIDER: u32 = 1024 * FINDIV_MAX;

/// A total divider factored into its two stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DividerSetting {
    pub pre: u32,
    pub fin: u32,
}

impl DividerSetting {
    /// `PREDIV` field code.
    pub const fn pre_code(&self) -> u32 {
        match self.pre {
            1 => 0,
            2 => 1,
            4 => 3,
            _ => 0x3FF,
        }
    }

    /// `FINDIV` field code.
    pub const fn fin_code(&self) -> u32 {
        self.fin - 1
    }

    pub const fn total(&self) -> u32 {
        self.pre * self.fin
    }
}

/// Ratio of a `PREDIV` field code.
pub const fn decode_prediv(code: u32) -> u32 {
    match code {
        0 => 1,
        1 => 2,
        3 => 4,
        _ => 1024,
    }
}

/// Factor `total` into the smallest pre-divider with `total / pre <= 64`.
///
/// Totals that are not a multiple of the chosen pre-divider are truncated,
/// except that the final divider never drops below 1.
pub fn compute_divider(total: u32) -> Result<DividerSetting, Error> {
    if total == 0 || total > MAX_DIVIDER {
        return Err(Error::InvalidDivider);
    }
    let pre = PREDIV_RATIOS
        .iter()
        .copied()
        .find(|&pre| total / pre <= FINDIV_MAX)
        .ok_or(Error::InvalidDivider)?;
    Ok(DividerSetting {
        pre,
        fin: (total / pre).max(1),
    })
}

/// Smallest representable divider that is at least `min`.
pub fn round_up_divider(min: u32) -> Result<u32, Error> {
    let min = min.max(1);
    PREDIV_RATIOS
        .iter()
        .find_map(|&pre| {
            let fin = min.div_ceil(pre);
            (fin <= FINDIV_MAX).then_some(pre * fin)
        })
        .ok_or(Error::InvalidDivider)
}

impl<R: RegisterAccess, T: TickSource> Flexgen<R, T> {
    /// Total divider of `channel`.
    pub fn get_div(&mut self, channel: u8) -> Result<u32, Error> {
        self.check_channel(channel)?;
        let pre: PreDivCfgr = self.regs.load(Reg::PreDivCfgr(channel));
        let fin: FinDivCfgr = self.regs.load(Reg::FinDivCfgr(channel));
        Ok(decode_prediv(pre.read(PREDIVCFGR::PREDIV)) * (fin.read(FINDIVCFGR::FINDIV) + 1))
    }

    /// Program the total divider of `channel`, pre-divider first.
    ///
    /// A stage already holding the target value is not written. When a stage
    /// does not settle, every stage written by this call is restored and
    /// `Timeout` is returned, so the channel keeps its previous divider.
    pub fn set_div(&mut self, channel: u8, total: u32) -> Result<(), Error> {
        self.check_channel(channel)?;
        let setting = compute_divider(total)?;
        if setting.total() != total {
            debug!("flexgen: divider {} truncated to {}", total, setting.total());
        }

        let pre: PreDivCfgr = self.regs.load(Reg::PreDivCfgr(channel));
        let pre_changed = pre.read(PREDIVCFGR::PREDIV) != setting.pre_code();
        if pre_changed {
            let value = PREDIVCFGR::PREDIV.val(setting.pre_code()).modify(pre.get());
            self.write_div_stage(channel, Reg::PreDivCfgr(channel), value)?;
        }

        let fin: FinDivCfgr = self.regs.load(Reg::FinDivCfgr(channel));
        if fin.read(FINDIVCFGR::FINDIV) != setting.fin_code() {
            let value = FINDIVCFGR::FINDIV.val(setting.fin_code()).modify(fin.get());
            if let Err(e) = self.write_div_stage(channel, Reg::FinDivCfgr(channel), value) {
                if pre_changed {
                    warn!("flexgen: channel {} restoring pre-divider {:#x}", channel, pre.get());
                    if self.write_div_stage(channel, Reg::PreDivCfgr(channel), pre.get()).is_err() {
                        error!("flexgen: channel {} pre-divider restore did not settle", channel);
                    }
                }
                return Err(e);
            }
        }

        Ok(())
    }

    fn write_div_stage(&mut self, channel: u8, reg: Reg, value: u32) -> Result<(), Error> {
        let (bank, bit) = status_bank_bit(channel);
        let status = match reg {
            Reg::PreDivCfgr(_) => Reg::PreDivSr(bank),
            _ => Reg::FinDivSr(bank),
        };
        Transaction::new(GuardedWrite {
            reg,
            value,
            busy: (status, bit.val(1).into()),
            timeout_ms: self.config.div_timeout_ms,
            retry_timeout_ms: None,
        })
        .run(self)
    }
}
