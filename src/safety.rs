//! Electromechanical safety interlocks.
//!
//! Every actuator transition passes through one of the `can_*` predicates
//! below.  These are hard invariants, not advisory: the compressor minimum
//! on/off times are manufacturer-mandated, and switching the four-way
//! reversing valve under load welds it.
//!
//! All predicates are pure functions over the two unit records, the
//! current thermal readings, and the inbound command, so the whole family
//! is testable without any hardware.

use crate::comms::Command;
use crate::unit::{Actuator, Mode, Unit, UnitState, UnitTemps};

/// Minimum ticks the compressor must rest before restarting (≈ 8 min).
pub const MIN_COMP_OFF_TICKS: u64 = 96;
/// Minimum ticks the compressor must run before a regular stop (≈ 7 min).
pub const MIN_COMP_ON_TICKS: u64 = 84;
/// The other unit's compressor must have run longer than this before we
/// start ours, spreading the inrush currents ~30 s apart.
pub const COMP_STAGGER_TICKS: u64 = 6;
/// The compressor must have been off for more than this before the valve
/// may move.
pub const VALVE_SETTLE_TICKS: u64 = 1;
/// The valve must have been in position at least this long before the
/// compressor may start against it.
pub const VALVE_HOLD_TICKS: u64 = 2;
/// No compressor start above this shell temperature, °C.
pub const COMP_START_MAX_C: f32 = 59.0;

/// Snapshot view over both units for one tick's interlock decisions.
pub struct Interlocks<'a> {
    units: &'a [UnitState; 2],
    temps: [UnitTemps; 2],
    enabled: [bool; 2],
    command: Command,
}

impl<'a> Interlocks<'a> {
    pub fn new(
        units: &'a [UnitState; 2],
        temps: [UnitTemps; 2],
        enabled: [bool; 2],
        command: Command,
    ) -> Self {
        Self {
            units,
            temps,
            enabled,
            command,
        }
    }

    /// May this unit's compressor be energized now?
    ///
    /// Requires: unit enabled, compressor currently off, shell temperature
    /// acceptable, valve settled in position, anti-short-cycle rest served
    /// (waived during defrost, which toggles the compressor on a fixed
    /// schedule), and the cross-unit start stagger.
    pub fn can_comp_on(&self, u: Unit) -> bool {
        let me = &self.units[u.index()];
        if !self.enabled[u.index()] || me.compressor_on() {
            return false;
        }
        if self.temps[u.index()].comp > COMP_START_MAX_C {
            return false;
        }
        if me.cycles(Actuator::Valve) < VALVE_HOLD_TICKS {
            return false;
        }
        if me.mode != Mode::Defrost && me.cycles(Actuator::Compressor) < MIN_COMP_OFF_TICKS {
            return false;
        }
        let other = &self.units[u.other().index()];
        !other.compressor_on() || other.cycles(Actuator::Compressor) > COMP_STAGGER_TICKS
    }

    /// May this unit's compressor be de-energized now?
    ///
    /// Unconditional in defrost, over-heat protection, and under the
    /// battery command; otherwise the minimum-on time must be served.
    pub fn can_comp_off(&self, u: Unit) -> bool {
        let me = &self.units[u.index()];
        if !me.compressor_on() {
            return false;
        }
        matches!(me.mode, Mode::Defrost | Mode::Ohp)
            || self.command == Command::Battery
            || me.cycles(Actuator::Compressor) >= MIN_COMP_ON_TICKS
    }

    /// The reversing valve may move only against a stopped compressor.
    pub fn can_valve_change(&self, u: Unit) -> bool {
        let me = &self.units[u.index()];
        !me.compressor_on() && me.cycles(Actuator::Compressor) > VALVE_SETTLE_TICKS
    }

    /// Gate for one desired actuator transition.  Fans are free.
    pub fn permits(&self, u: Unit, actuator: Actuator, on: bool) -> bool {
        match actuator {
            Actuator::Compressor => {
                if on {
                    self.can_comp_on(u)
                } else {
                    self.can_comp_off(u)
                }
            }
            Actuator::Fan => true,
            Actuator::Valve => self.can_valve_change(u),
        }
    }

    /// Counts feeding the response encoder: a unit is startable when its
    /// compressor could come on and it is not mid-defrost; stoppable when
    /// its compressor could go off.
    pub fn startable_stoppable(&self) -> (u8, u8) {
        let mut startable = 0;
        let mut stoppable = 0;
        for u in Unit::BOTH {
            if self.can_comp_on(u) && self.units[u.index()].mode != Mode::Defrost {
                startable += 1;
            }
            if self.can_comp_off(u) {
                stoppable += 1;
            }
        }
        (startable, stoppable)
    }
}
