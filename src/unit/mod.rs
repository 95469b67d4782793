//! Per-unit control records.
//!
//! Each outdoor unit carries three relay-driven actuators and a mode.  All
//! timing in the decision layer is expressed in *ticks in current state*:
//! every actuator and the mode each have a cycle counter that increments
//! once per tick and resets to zero when its subject changes.  Seconds only
//! appear at the reporting boundary.

pub mod fsm;

use std::fmt;

/// The two outdoor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Unit {
    Ac1 = 0,
    Ac2 = 1,
}

impl Unit {
    pub const BOTH: [Unit; 2] = [Unit::Ac1, Unit::Ac2];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn other(self) -> Unit {
        match self {
            Unit::Ac1 => Unit::Ac2,
            Unit::Ac2 => Unit::Ac1,
        }
    }

    /// 1-based unit number for logs and reports.
    pub const fn number(self) -> usize {
        self.index() + 1
    }
}

/// The three actuators of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Actuator {
    Compressor = 0,
    Fan = 1,
    Valve = 2,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Actuator::Compressor, Actuator::Fan, Actuator::Valve];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Operating mode of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Off = 0,
    Starting = 1,
    /// Compressor running with the fan held off, venting waste heat
    /// through the fin stack to bring the compressor shell back down.
    CompCooling = 2,
    /// Normal heat extraction: compressor and fan running.
    FinHeating = 3,
    /// Programmed reverse-cycle defrost of the outdoor fin stack.
    Defrost = 4,
    /// Over-heat protection lockout.
    Ohp = 5,
}

impl Mode {
    /// Short label used in the data log.
    pub const fn label(self) -> &'static str {
        match self {
            Mode::Off => "OFF",
            Mode::Starting => "START",
            Mode::CompCooling => "CCOOL",
            Mode::FinHeating => "FHEAT",
            Mode::Defrost => "DFRST",
            Mode::Ohp => "OHP",
        }
    }

    /// Modes in which the compressor is (or may be) producing heat.
    pub const fn is_running(self) -> bool {
        matches!(self, Mode::Starting | Mode::CompCooling | Mode::FinHeating)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Thermal readings one unit decides on.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitTemps {
    /// Compressor shell temperature, °C.
    pub comp: f32,
    /// Outdoor fin stack (condenser) temperature, °C.
    pub cond: f32,
}

// ---------------------------------------------------------------------------
// Unit state
// ---------------------------------------------------------------------------

/// Actuator states, mode, and the cycles-in-state counters of one unit.
#[derive(Debug, Clone, Copy)]
pub struct UnitState {
    actuators: [bool; 3],
    cycles: [u64; 3],
    pub mode: Mode,
    /// Ticks spent in the current mode.
    pub mode_cycles: u64,
}

impl Default for UnitState {
    fn default() -> Self {
        Self {
            actuators: [false; 3],
            cycles: [0; 3],
            mode: Mode::Off,
            mode_cycles: 0,
        }
    }
}

impl UnitState {
    pub fn is_on(&self, a: Actuator) -> bool {
        self.actuators[a.index()]
    }

    /// Ticks since the actuator last changed state.
    pub fn cycles(&self, a: Actuator) -> u64 {
        self.cycles[a.index()]
    }

    pub fn compressor_on(&self) -> bool {
        self.is_on(Actuator::Compressor)
    }

    pub fn fan_on(&self) -> bool {
        self.is_on(Actuator::Fan)
    }

    pub fn valve_on(&self) -> bool {
        self.is_on(Actuator::Valve)
    }

    /// Set an actuator; a real change resets its cycle counter and is
    /// reported back so the driver can mirror it to GPIO.
    pub fn apply(&mut self, a: Actuator, on: bool) -> bool {
        if self.actuators[a.index()] == on {
            return false;
        }
        self.actuators[a.index()] = on;
        self.cycles[a.index()] = 0;
        true
    }

    /// Enter a mode, resetting the mode cycle counter.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.mode_cycles = 0;
    }

    /// Advance all cycle counters by one tick.
    pub fn advance(&mut self) {
        for c in &mut self.cycles {
            *c = c.saturating_add(1);
        }
        self.mode_cycles = self.mode_cycles.saturating_add(1);
    }
}
