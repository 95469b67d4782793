//! Load sharer: turns the sibling's command into per-unit desires.
//!
//! The arbiter owns no timing — it only says which units *should* run.
//! Whether a compressor may actually switch this tick stays with the
//! interlocks.  Fair share is decided on the cumulative run-cycle ledger:
//! when both units are equally eligible, the less-used one is preferred, so
//! wear spreads evenly over the machine pair's life.

use log::info;

use crate::comms::Command;
use crate::safety::Interlocks;
use crate::unit::{Mode, Unit, UnitState};

/// Per-unit run desires, persistent across ticks (the BUSY command keeps
/// whatever was last decided).
#[derive(Debug, Default)]
pub struct Arbiter {
    want: [bool; 2],
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wanted(&self) -> [bool; 2] {
        self.want
    }

    /// Re-evaluate desires for this tick.
    pub fn decide(
        &mut self,
        command: Command,
        enabled: [bool; 2],
        run_cycles: [u64; 2],
        units: &[UnitState; 2],
        locks: &Interlocks<'_>,
    ) -> [bool; 2] {
        let before = self.want;

        match command {
            Command::Busy => {} // peer busy: no change
            Command::Low => self.decide_low(enabled, run_cycles, units, locks),
            Command::High => self.want = [true, true],
            Command::Battery => self.want = [false, false],
        }

        for u in Unit::BOTH {
            if !enabled[u.index()] {
                self.want[u.index()] = false;
            }
            // A unit mid-defrost finishes its schedule no matter what.
            if units[u.index()].mode == Mode::Defrost {
                self.want[u.index()] = true;
            }
        }

        if self.want != before {
            info!(
                "arbiter: command {command} -> want AC1={} AC2={}",
                self.want[0] as u8, self.want[1] as u8
            );
        }
        self.want
    }

    /// LOW: exactly one unit should compress, chosen by fair share.
    fn decide_low(
        &mut self,
        enabled: [bool; 2],
        run_cycles: [u64; 2],
        units: &[UnitState; 2],
        locks: &Interlocks<'_>,
    ) {
        let on = [units[0].compressor_on(), units[1].compressor_on()];
        match (on[0], on[1]) {
            // Nothing running: start the less-used enabled unit; if the
            // interlocks block it but not its peer, take the peer instead.
            (false, false) => {
                let pick = match (enabled[0], enabled[1]) {
                    (true, true) => {
                        let mut p = if run_cycles[0] <= run_cycles[1] {
                            Unit::Ac1
                        } else {
                            Unit::Ac2
                        };
                        if !locks.can_comp_on(p) && locks.can_comp_on(p.other()) {
                            p = p.other();
                        }
                        Some(p)
                    }
                    (true, false) => Some(Unit::Ac1),
                    (false, true) => Some(Unit::Ac2),
                    (false, false) => None,
                };
                self.want = [false, false];
                if let Some(p) = pick {
                    self.want[p.index()] = true;
                }
            }
            // One running: keep it.
            (true, false) => self.want = [true, false],
            (false, true) => self.want = [false, true],
            // Both running: shed the more-used one.
            (true, true) => {
                let keep = if run_cycles[0] <= run_cycles[1] {
                    Unit::Ac1
                } else {
                    Unit::Ac2
                };
                self.want = [keep == Unit::Ac1, keep == Unit::Ac2];
            }
        }
    }
}
