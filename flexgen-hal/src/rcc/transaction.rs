//! Guarded register write: wait for idle, write, wait for completion,
//! restore the previous value if the hardware never settles.
//!
//! ```text
//! Polling ──idle──▶ Committing ──▶ Verifying ──settled──▶ Done
//!    │                                │ (retry once with the extended timeout)
//!  busy                            still busy
//!    ▼                                ▼
//! Failed ◀────────────────────── RollingBack
//! ```

use super::{Error, Flexgen};
use crate::regs::{Reg, RegisterAccess};
use crate::time::TickSource;

/// One register update protected by a busy flag.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GuardedWrite {
    pub reg: Reg,
    pub value: u32,
    /// Busy flag register and mask: set while the hardware applies the update.
    pub busy: (Reg, u32),
    pub timeout_ms: u64,
    /// Second completion poll after a failed first one.
    pub retry_timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Polling,
    Committing,
    Verifying { retried: bool },
    RollingBack,
    Done,
    Failed,
}

pub(crate) struct Transaction {
    write: GuardedWrite,
    phase: Phase,
    saved: u32,
}

impl Transaction {
    pub fn new(write: GuardedWrite) -> Self {
        Self {
            write,
            phase: Phase::Polling,
            saved: 0,
        }
    }

    /// Advances by one phase. Terminal phases stay where they are.
    pub fn step<R: RegisterAccess, T: TickSource>(&mut self, fg: &mut Flexgen<R, T>) -> Phase {
        let GuardedWrite {
            reg,
            value,
            busy: (busy_reg, busy_mask),
            timeout_ms,
            retry_timeout_ms,
        } = self.write;
        let is_busy = move |regs: &mut R| regs.read(busy_reg) & busy_mask != 0;

        self.phase = match self.phase {
            Phase::Polling => match fg.wait_while(timeout_ms, is_busy) {
                Ok(()) => Phase::Committing,
                Err(()) => {
                    warn!("flexgen: {:?} busy before write", reg);
                    Phase::Failed
                }
            },
            Phase::Committing => {
                self.saved = fg.regs.read(reg);
                fg.regs.write(reg, value);
                Phase::Verifying { retried: false }
            }
            Phase::Verifying { retried } => {
                let timeout = match (retried, retry_timeout_ms) {
                    (false, _) => timeout_ms,
                    (true, Some(retry)) => retry,
                    (true, None) => timeout_ms,
                };
                match fg.wait_while(timeout, is_busy) {
                    Ok(()) => Phase::Done,
                    Err(()) if !retried && retry_timeout_ms.is_some() => {
                        debug!("flexgen: {:?} slow to settle, extending wait", reg);
                        Phase::Verifying { retried: true }
                    }
                    Err(()) => {
                        warn!("flexgen: {:?} did not settle, restoring {:#x}", reg, self.saved);
                        Phase::RollingBack
                    }
                }
            }
            Phase::RollingBack => {
                fg.regs.write(reg, self.saved);
                if fg.wait_while(timeout_ms, is_busy).is_err() {
                    error!("flexgen: {:?} rollback did not settle, register state unknown", reg);
                }
                Phase::Failed
            }
            terminal @ (Phase::Done | Phase::Failed) => terminal,
        };
        self.phase
    }

    pub fn run<R: RegisterAccess, T: TickSource>(mut self, fg: &mut Flexgen<R, T>) -> Result<(), Error> {
        loop {
            match self.step(fg) {
                Phase::Done => return Ok(()),
                Phase::Failed => return Err(Error::Timeout),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rcc::Config;
    use crate::regs::XBARCFGR;
    use crate::sim::{BusyMode, SimRegisters, SimTicks};

    fn write() -> GuardedWrite {
        GuardedWrite {
            reg: Reg::XbarCfgr(3),
            value: XBARCFGR::SEL.val(6).into(),
            busy: (Reg::XbarCfgr(3), XBARCFGR::STS::SET.into()),
            timeout_ms: 1,
            retry_timeout_ms: Some(10),
        }
    }

    fn flexgen(mode: BusyMode) -> Flexgen<SimRegisters, SimTicks> {
        let mut regs = SimRegisters::new();
        regs.xbar_busy = mode;
        Flexgen::new(regs, SimTicks::new(), Config::new())
    }

    #[test]
    fn happy_path_visits_every_phase() {
        let mut fg = flexgen(BusyMode::Idle);
        let mut tx = Transaction::new(write());
        assert_eq!(tx.step(&mut fg), Phase::Committing);
        assert_eq!(tx.step(&mut fg), Phase::Verifying { retried: false });
        assert_eq!(tx.step(&mut fg), Phase::Done);
        assert_eq!(tx.step(&mut fg), Phase::Done);
        assert_eq!(fg.regs().peek(Reg::XbarCfgr(3)), 6);
    }

    #[test]
    fn busy_before_write_fails_without_writing() {
        let mut fg = flexgen(BusyMode::Stuck);
        let mut tx = Transaction::new(write());
        assert_eq!(tx.step(&mut fg), Phase::Failed);
        assert_eq!(fg.regs().write_count(), 0);
    }

    #[test]
    fn settles_during_extended_wait() {
        // busy for 5 polls: longer than the 1 ms baseline, shorter than the retry
        let mut fg = flexgen(BusyMode::ClearsAfter(5));
        let mut tx = Transaction::new(write());
        tx.step(&mut fg);
        tx.step(&mut fg);
        assert_eq!(tx.step(&mut fg), Phase::Verifying { retried: true });
        assert_eq!(tx.step(&mut fg), Phase::Done);
    }

    #[test]
    fn stuck_after_write_restores_previous_value() {
        let mut fg = flexgen(BusyMode::StuckAfterWrite);
        fg.regs().poke(Reg::XbarCfgr(3), XBARCFGR::SEL.val(2).into());
        let mut tx = Transaction::new(write());
        tx.step(&mut fg);
        tx.step(&mut fg);
        assert_eq!(tx.step(&mut fg), Phase::Verifying { retried: true });
        assert_eq!(tx.step(&mut fg), Phase::RollingBack);
        assert_eq!(tx.step(&mut fg), Phase::Failed);
        assert_eq!(XBARCFGR::SEL.read(fg.regs().peek(Reg::XbarCfgr(3))), 2);
        assert_eq!(fg.regs().write_count(), 2);
    }

    #[test]
    fn run_maps_failure_to_timeout() {
        let mut fg = flexgen(BusyMode::StuckAfterWrite);
        assert_eq!(Transaction::new(write()).run(&mut fg), Err(Error::Timeout));
        let mut fg = flexgen(BusyMode::Idle);
        assert_eq!(Transaction::new(write()).run(&mut fg), Ok(()));
    }
}
