//! Port traits — the boundary between the decision core and the machine.
//!
//! ```text
//!   sysfs adapters ──▶ port trait ──▶ Supervisor (domain)
//! ```
//!
//! The supervisor consumes these via generics, so the whole decision layer
//! runs against recording mocks in tests.  Internally every line level is
//! logical ("true = energized"); polarity inversion for active-low relay
//! boards is applied inside the output adapter and nowhere else.

use crate::sensors::SensorId;
use crate::unit::{Actuator, Unit};

// ───────────────────────────────────────────────────────────────
// Sensor bus (driven adapter: 1-Wire files → domain)
// ───────────────────────────────────────────────────────────────

/// One blocking temperature read per channel per tick.
///
/// `None` means "this tick produced no reading" — open/read failure or an
/// unparseable record.  The sanity filter decides what to do about it.
pub trait SensorBus {
    fn read_channel(&mut self, id: SensorId) -> Option<f32>;
}

// ───────────────────────────────────────────────────────────────
// Digital I/O (driven adapter: domain ↔ GPIO)
// ───────────────────────────────────────────────────────────────

/// Named logical lines.  The mapping to BCM pin numbers lives in the
/// configuration; the decision core never sees a pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// Relay output for one actuator of one unit.
    Relay(Unit, Actuator),
    /// Command input bit from the sibling controller (0 or 1).
    CommandBit(u8),
    /// Response output bit to the sibling controller (0 or 1).
    ResponseBit(u8),
}

impl Line {
    /// Relay lines carry machine power and honour `invert_output`;
    /// response bits are a logic-level protocol with the peer and do not.
    pub fn is_inverted_output(self) -> bool {
        matches!(self, Line::Relay(..))
    }
}

/// Digital line access.  Implementations log their own failures; the
/// supervisor treats errors as "line unavailable this tick".
pub trait DigitalIo {
    fn read_line(&mut self, line: Line) -> std::io::Result<bool>;
    fn write_line(&mut self, line: Line, on: bool) -> std::io::Result<()>;
}
