//! Mock hardware for integration tests.
//!
//! Records every relay and response-bit write so tests can assert on the
//! full command history without touching sysfs.

use std::collections::HashMap;

use hpmd::app::ports::{DigitalIo, Line, SensorBus};
use hpmd::comms::Command;
use hpmd::sensors::{SensorId, SENSOR_COUNT};
use hpmd::unit::{Actuator, Unit};

// ── Sensor bus ───────────────────────────────────────────────

pub struct MockBus {
    pub temps: [Option<f32>; SENSOR_COUNT],
}

#[allow(dead_code)]
impl MockBus {
    pub fn uniform(v: f32) -> Self {
        Self {
            temps: [Some(v); SENSOR_COUNT],
        }
    }

    pub fn set(&mut self, id: SensorId, v: f32) {
        self.temps[id.index()] = Some(v);
    }

    /// Make a channel unreadable from now on.
    pub fn kill(&mut self, id: SensorId) {
        self.temps[id.index()] = None;
    }
}

impl SensorBus for MockBus {
    fn read_channel(&mut self, id: SensorId) -> Option<f32> {
        self.temps[id.index()]
    }
}

// ── Digital I/O ──────────────────────────────────────────────

pub struct MockIo {
    pub command: Command,
    pub lines: HashMap<Line, bool>,
    pub writes: Vec<(Line, bool)>,
}

#[allow(dead_code)]
impl MockIo {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            lines: HashMap::new(),
            writes: Vec::new(),
        }
    }

    pub fn relay(&self, u: Unit, a: Actuator) -> bool {
        self.lines.get(&Line::Relay(u, a)).copied().unwrap_or(false)
    }

    pub fn response_bits(&self) -> u8 {
        let b0 = self.lines.get(&Line::ResponseBit(0)).copied().unwrap_or(false);
        let b1 = self.lines.get(&Line::ResponseBit(1)).copied().unwrap_or(false);
        (b0 as u8) | ((b1 as u8) << 1)
    }
}

impl DigitalIo for MockIo {
    fn read_line(&mut self, line: Line) -> std::io::Result<bool> {
        Ok(match line {
            Line::CommandBit(0) => (self.command as u8) & 1 != 0,
            Line::CommandBit(1) => (self.command as u8) & 2 != 0,
            other => self.lines.get(&other).copied().unwrap_or(false),
        })
    }

    fn write_line(&mut self, line: Line, on: bool) -> std::io::Result<()> {
        self.lines.insert(line, on);
        self.writes.push((line, on));
        Ok(())
    }
}
