//! The per-unit mode state machine.
//!
//! ```text
//!  OFF ──[wanted ∧ CanCompOn ∧ valve in position]──▶ STARTING
//!                                                       │
//!            ┌─[Tcomp > 56]──────────────────────────────┤
//!            ▼                                           │ [24 ticks]
//!      COMP-COOLING ◀──[Tcomp > 56, 10 ticks]──┐         ▼
//!            │                                 ├── FIN-STACK-HEATING
//!            └──[Tcomp < 56, 10 ticks]─────────┘         │
//!                                                        │ [fin stack iced]
//!                      STARTING ◀──[82 ticks]── DEFROST ◀┘
//!
//!  any running ──[Tcomp > 63]──▶ OHP ──[recovered, 24 ticks]──▶ OFF
//!  any running ──[no longer wanted ∧ CanCompOff]──▶ OFF
//! ```
//!
//! Transitions are decided first each tick, on the counters as they stood
//! at the end of the previous tick; the winning mode then determines the
//! actuator requests that the driver pushes through the interlocks.
//! DEFROST is special twice over: it runs a fixed 82-tick schedule that
//! ignores the arbiter entirely, and it is the one mode allowed to toggle
//! the compressor faster than the anti-short-cycle rest.

use crate::comms::Command;
use crate::safety::{Interlocks, COMP_START_MAX_C};
use crate::unit::{Actuator, Mode, Unit, UnitState, UnitTemps};

/// Compressor shell temperature steering the cooling/heating flip, °C.
pub const COMP_HOT_C: f32 = 56.0;
/// Over-heat protection trip point, °C.
pub const OHP_TRIP_C: f32 = 63.0;
/// Ticks before STARTING gives up waiting for the shell to warm.
const STARTING_TIMEOUT_TICKS: u64 = 24;
/// Minimum dwell in the cooling/heating pair before flipping back.
const COOL_HEAT_HOLD_TICKS: u64 = 10;
/// Fast defrost trip: fin stack this cold after ~13 min of heating.
const DEFROST_FAST_TICKS: u64 = 159;
const DEFROST_FAST_COND_C: f32 = -6.0;
/// Slow defrost trip: milder icing after ~30 min of heating.
const DEFROST_SLOW_TICKS: u64 = 359;
const DEFROST_SLOW_COND_C: f32 = -3.0;
/// Length of the defrost schedule.
pub const DEFROST_TICKS: u64 = 82;
/// OHP releases after the shell has been recovered this long.
const OHP_RECOVERY_TICKS: u64 = 24;

// ---------------------------------------------------------------------------
// Actuator requests
// ---------------------------------------------------------------------------

/// What a unit's mode wants from its three actuators this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorRequest {
    pub compressor: bool,
    pub fan: bool,
    pub valve: bool,
}

impl ActuatorRequest {
    pub const fn get(&self, a: Actuator) -> bool {
        match a {
            Actuator::Compressor => self.compressor,
            Actuator::Fan => self.fan,
            Actuator::Valve => self.valve,
        }
    }

    const fn new(compressor: bool, fan: bool, valve: bool) -> Self {
        Self {
            compressor,
            fan,
            valve,
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Decide this tick's mode transition for one unit, if any.
pub fn next_mode(
    u: Unit,
    st: &UnitState,
    temps: UnitTemps,
    wanted: bool,
    locks: &Interlocks<'_>,
) -> Option<Mode> {
    // A running unit trips over-heat protection before anything else.
    if st.mode.is_running() && temps.comp > OHP_TRIP_C {
        return Some(Mode::Ohp);
    }
    // A running unit the arbiter no longer wants goes dark as soon as the
    // minimum-on interlock lets its compressor stop.
    if st.mode.is_running() && !wanted && (!st.compressor_on() || locks.can_comp_off(u)) {
        return Some(Mode::Off);
    }

    match st.mode {
        Mode::Off => {
            (wanted && st.valve_on() && locks.can_comp_on(u)).then_some(Mode::Starting)
        }
        Mode::Starting => {
            if temps.comp > COMP_HOT_C {
                Some(Mode::CompCooling)
            } else if st.mode_cycles > STARTING_TIMEOUT_TICKS {
                Some(Mode::FinHeating)
            } else {
                None
            }
        }
        Mode::CompCooling => {
            (temps.comp < COMP_HOT_C && st.mode_cycles > COOL_HEAT_HOLD_TICKS)
                .then_some(Mode::FinHeating)
        }
        Mode::FinHeating => {
            if temps.comp > COMP_HOT_C && st.mode_cycles > COOL_HEAT_HOLD_TICKS {
                Some(Mode::CompCooling)
            } else if st.mode_cycles > DEFROST_FAST_TICKS && temps.cond < DEFROST_FAST_COND_C {
                Some(Mode::Defrost)
            } else if st.mode_cycles > DEFROST_SLOW_TICKS && temps.cond < DEFROST_SLOW_COND_C {
                Some(Mode::Defrost)
            } else {
                None
            }
        }
        // The schedule must complete regardless of commands or temperatures.
        Mode::Defrost => (st.mode_cycles >= DEFROST_TICKS).then_some(Mode::Starting),
        Mode::Ohp => {
            (!st.compressor_on()
                && st.mode_cycles > OHP_RECOVERY_TICKS
                && temps.comp <= COMP_START_MAX_C)
                .then_some(Mode::Off)
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The actuator triple the unit's current mode asks for.
///
/// Under the battery command everything shuts down with the valve driven to
/// its heating position, so the refrigerant path is correct the moment mains
/// power returns — except mid-defrost, where the schedule keeps control.
pub fn requests(st: &UnitState, wanted: bool, command: Command) -> ActuatorRequest {
    if command == Command::Battery && st.mode != Mode::Defrost {
        return ActuatorRequest::new(false, false, true);
    }

    match st.mode {
        // Waiting units pre-position the valve so STARTING finds it ready.
        Mode::Off => ActuatorRequest::new(false, false, wanted || st.valve_on()),
        Mode::Starting => ActuatorRequest::new(true, true, true),
        Mode::CompCooling => ActuatorRequest::new(true, false, true),
        Mode::FinHeating => ActuatorRequest::new(true, true, true),
        Mode::Defrost => defrost_schedule(st.mode_cycles),
        Mode::Ohp => ActuatorRequest::new(false, false, st.valve_on()),
    }
}

/// The banded defrost schedule.  The valve drops out of the heating
/// position, the compressor pushes hot gas through the fin stack, then the
/// system settles back before the valve returns:
///
/// | ticks  | valve | compressor | fan |
/// |--------|-------|------------|-----|
/// | 0–8    | ON    | off        | off |
/// | 9–17   | off   | off        | off |
/// | 18–57  | off   | ON         | off |
/// | 58–69  | off   | off        | off |
/// | 70–81  | ON    | off        | off |
pub fn defrost_schedule(mode_cycles: u64) -> ActuatorRequest {
    match mode_cycles {
        0..=8 => ActuatorRequest::new(false, false, true),
        9..=17 => ActuatorRequest::new(false, false, false),
        18..=57 => ActuatorRequest::new(true, false, false),
        58..=69 => ActuatorRequest::new(false, false, false),
        _ => ActuatorRequest::new(false, false, true),
    }
}
