//! Two-bit command/response link with the sibling controller.
//!
//! The physical link is four digital lines: two inputs carrying the
//! command, two outputs carrying the response.  The bit encodings are an
//! external contract with the peer's firmware; internally both registers
//! are modelled as enums and only turned into bits at the GPIO boundary.

use std::fmt;

// ---------------------------------------------------------------------------
// Inbound command
// ---------------------------------------------------------------------------

/// What the sibling controller asks of us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Peer busy — keep the current desires.
    Busy = 0,
    /// At most one unit may compress.
    Low = 1,
    /// Both units may compress.
    High = 2,
    /// Running on battery backup — fail-safe shutdown.
    Battery = 3,
}

impl Command {
    /// Assemble from the two input lines (bit 0, bit 1).
    pub fn from_bits(bit0: bool, bit1: bool) -> Self {
        match (bit1, bit0) {
            (false, false) => Self::Busy,
            (false, true) => Self::Low,
            (true, false) => Self::High,
            (true, true) => Self::Battery,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Busy => "BUSY",
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Battery => "BATTERY",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Outbound response
// ---------------------------------------------------------------------------

/// What we report back: whether a unit could be started or stopped right
/// now, without exposing any of the timing state behind that answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Response {
    NoChange = 0,
    CanAdd = 1,
    CanRemove = 2,
    CanAddAndRemove = 3,
}

impl Response {
    /// Split into the two output lines (bit 0, bit 1).
    pub fn bits(self) -> (bool, bool) {
        let v = self as u8;
        (v & 1 != 0, v & 2 != 0)
    }

    fn from_low_bits(v: u8) -> Self {
        match v & 3 {
            0 => Self::NoChange,
            1 => Self::CanAdd,
            2 => Self::CanRemove,
            _ => Self::CanAddAndRemove,
        }
    }
}

/// Encode the response from the interlock summary.
///
/// `nr_startable` counts units whose compressor could start this tick
/// (excluding units mid-defrost); `nr_stoppable` counts units whose
/// compressor could stop.  The arithmetic is inherited from the peer
/// protocol and is pinned verbatim by the truth-table test below — the
/// peer decodes these exact values, so it must not be "simplified".
pub fn encode_response(mode_off: bool, nr_startable: u8, nr_stoppable: u8) -> Response {
    if mode_off || (nr_startable == 0 && nr_stoppable == 0) {
        return Response::NoChange;
    }
    let mut k: u8 = 0;
    if nr_startable > 0 {
        k = 1;
    }
    if nr_startable == nr_stoppable {
        k = 0;
    }
    if nr_stoppable > 0 {
        k += 1 + nr_stoppable + nr_startable;
    }
    Response::from_low_bits(k)
}
