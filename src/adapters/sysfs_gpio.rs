//! sysfs GPIO adapter.
//!
//! Classic `/sys/class/gpio` plumbing: export each pin, set its direction,
//! then read/write `gpioN/value`.  This is the single point where logical
//! line levels meet the electrical world — `invert_output` is applied here
//! to the six relay lines and nowhere else, so the rest of the daemon can
//! reason in "true = energized" terms.  The two response bits to the
//! sibling controller are a logic-level protocol and are never inverted.

use std::fs;
use std::io;
use std::path::PathBuf;

use log::{error, warn};

use crate::app::ports::{DigitalIo, Line};
use crate::config::Config;
use crate::unit::{Actuator, Unit};

const GPIO_ROOT: &str = "/sys/class/gpio";

/// All ten lines with their configured BCM pins.
pub struct SysfsGpio {
    root: PathBuf,
    invert_output: bool,
    pins: [(Line, u32); 10],
}

impl SysfsGpio {
    pub fn new(cfg: &Config) -> Self {
        Self::with_root(cfg, PathBuf::from(GPIO_ROOT))
    }

    /// Rooted constructor so tests can run against a scratch directory.
    pub fn with_root(cfg: &Config, root: PathBuf) -> Self {
        let p = &cfg.pins;
        Self {
            root,
            invert_output: cfg.invert_output,
            pins: [
                (Line::Relay(Unit::Ac1, Actuator::Compressor), p.ac1cmp),
                (Line::Relay(Unit::Ac1, Actuator::Fan), p.ac1fan),
                (Line::Relay(Unit::Ac1, Actuator::Valve), p.ac1v),
                (Line::Relay(Unit::Ac2, Actuator::Compressor), p.ac2cmp),
                (Line::Relay(Unit::Ac2, Actuator::Fan), p.ac2fan),
                (Line::Relay(Unit::Ac2, Actuator::Valve), p.ac2v),
                (Line::CommandBit(0), p.comms1),
                (Line::CommandBit(1), p.comms2),
                (Line::ResponseBit(0), p.comms3),
                (Line::ResponseBit(1), p.comms4),
            ],
        }
    }

    /// Update the relay polarity after a configuration reload.
    pub fn set_invert(&mut self, invert: bool) {
        self.invert_output = invert;
    }

    /// Export every pin.  Called once at startup; failure is fatal there.
    pub fn export_all(&self) -> io::Result<()> {
        for (_, pin) in self.pins {
            self.echo("export", pin)?;
        }
        Ok(())
    }

    /// Set directions: command bits in, everything else out.
    pub fn set_directions(&self) -> io::Result<()> {
        for (line, pin) in self.pins {
            let dir = match line {
                Line::CommandBit(_) => "in",
                _ => "out",
            };
            fs::write(self.root.join(format!("gpio{pin}/direction")), dir)?;
        }
        Ok(())
    }

    /// Drive every output to its de-energized level once.  A freshly
    /// exported pin sits at electrical 0, which on an active-low relay
    /// board would hold the relay energized until the first diff write.
    pub fn init_outputs(&mut self) -> io::Result<()> {
        for (line, _) in self.pins {
            if !matches!(line, Line::CommandBit(_)) {
                self.write_line(line, false)?;
            }
        }
        Ok(())
    }

    /// De-energize every output, then release all pins back to the kernel.
    /// Used on every shutdown path; collects the first error but keeps
    /// going so one stuck pin cannot keep the relays held.
    pub fn disable_all(&mut self) -> io::Result<()> {
        let mut first_err = None;
        for (line, _) in self.pins {
            if matches!(line, Line::CommandBit(_)) {
                continue;
            }
            if let Err(e) = self.write_line(line, false) {
                warn!("failed to clear {line:?} on shutdown: {e}");
                first_err.get_or_insert(e);
            }
        }
        for (_, pin) in self.pins {
            if let Err(e) = self.echo("unexport", pin) {
                warn!("failed to unexport pin {pin}: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn echo(&self, file: &str, pin: u32) -> io::Result<()> {
        fs::write(self.root.join(file), pin.to_string())
    }

    fn pin_of(&self, line: Line) -> u32 {
        // the line set is fixed at construction, so a miss is a programming
        // error, caught by the exhaustive mapping test below
        self.pins
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, p)| *p)
            .unwrap_or_else(|| {
                error!("no pin mapped for {line:?}");
                0
            })
    }

    fn level_for(&self, line: Line, on: bool) -> bool {
        if self.invert_output && line.is_inverted_output() {
            !on
        } else {
            on
        }
    }
}

impl DigitalIo for SysfsGpio {
    fn read_line(&mut self, line: Line) -> io::Result<bool> {
        let pin = self.pin_of(line);
        let raw = fs::read_to_string(self.root.join(format!("gpio{pin}/value")))?;
        Ok(raw.trim_start().starts_with('1'))
    }

    fn write_line(&mut self, line: Line, on: bool) -> io::Result<()> {
        let pin = self.pin_of(line);
        let level = self.level_for(line, on);
        fs::write(
            self.root.join(format!("gpio{pin}/value")),
            if level { "1" } else { "0" },
        )
    }
}
