//! Daemon configuration.
//!
//! Line-oriented `key=value` file; `#` and blank lines are ignored, unknown
//! keys are skipped silently so the file can be shared with sibling tools.
//! Parsing never fails hard: a missing file or a bad value falls back to the
//! previous (or default) setting and the result is logged line by line, so
//! the operator can always reconstruct the running configuration from the
//! log alone.
//!
//! A reload (SIGUSR1) re-parses into the *current* configuration: keys
//! absent from the file keep their running values.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::sensors::{SensorId, SENSOR_COUNT};

/// Default configuration file location.
pub const CONFIG_FILE: &str = "/etc/hpmd.cfg";

/// GPIO pins must stay on the usable Raspberry Pi header range.
const PIN_MIN: u32 = 4;
const PIN_MAX: u32 = 27;

// ---------------------------------------------------------------------------
// Pin assignment
// ---------------------------------------------------------------------------

/// BCM pin numbers for the six relays and the four comms lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pins {
    pub ac1cmp: u32,
    pub ac1fan: u32,
    pub ac1v: u32,
    pub ac2cmp: u32,
    pub ac2fan: u32,
    pub ac2v: u32,
    /// Command inputs from the sibling controller (bits 0 and 1).
    pub comms1: u32,
    pub comms2: u32,
    /// Response outputs to the sibling controller (bits 0 and 1).
    pub comms3: u32,
    pub comms4: u32,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            ac1cmp: 5,
            ac1fan: 6,
            ac1v: 13,
            ac2cmp: 16,
            ac2fan: 19,
            ac2v: 20,
            comms1: 17,
            comms2: 18,
            comms3: 27,
            comms4: 22,
        }
    }
}

impl Pins {
    pub fn all(&self) -> [u32; 10] {
        [
            self.ac1cmp, self.ac1fan, self.ac1v, self.ac2cmp, self.ac2fan, self.ac2v,
            self.comms1, self.comms2, self.comms3, self.comms4,
        ]
    }

    fn clamp_all(&mut self) {
        for p in [
            &mut self.ac1cmp,
            &mut self.ac1fan,
            &mut self.ac1v,
            &mut self.ac2cmp,
            &mut self.ac2fan,
            &mut self.ac2v,
            &mut self.comms1,
            &mut self.comms2,
            &mut self.comms3,
            &mut self.comms4,
        ] {
            *p = (*p).clamp(PIN_MIN, PIN_MAX);
        }
    }

    fn all_unique(&self) -> bool {
        let pins = self.all();
        for i in 0..pins.len() {
            for j in (i + 1)..pins.len() {
                if pins[i] == pins[j] {
                    return false;
                }
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// 0 = off (observe only), 1 = auto.  Clamped to [0, 8]; values the
    /// state machine does not know are treated as 0.
    pub mode: u8,
    pub use_ac1: bool,
    pub use_ac2: bool,
    /// Relay boards with active-low inputs get inverted output levels.
    pub invert_output: bool,
    /// Device file per sensor channel, indexed by [`SensorId`].
    pub sensor_paths: [PathBuf; SENSOR_COUNT],
    pub pins: Pins,
    /// Additive corrections, °C.
    pub wicorr: f32,
    pub wocorr: f32,
    pub tenvcorr: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: 1,
            use_ac1: true,
            use_ac2: true,
            invert_output: true,
            sensor_paths: std::array::from_fn(|i| PathBuf::from(format!("/dev/zero/{}", i + 1))),
            pins: Pins::default(),
            wicorr: 0.0,
            wocorr: 0.0,
            tenvcorr: 0.0,
        }
    }
}

impl Config {
    /// Parse `path` over the current values, then validate and log the
    /// result.  This is used both for the initial load and for reloads.
    pub fn reload(&mut self, path: &Path) {
        let opened = self.merge_file(path);
        self.validate();
        self.log_summary(opened);
    }

    pub fn enabled(&self) -> [bool; 2] {
        [self.use_ac1, self.use_ac2]
    }

    /// Render the configuration in the parse-friendly table format used by
    /// the current-config sink.
    pub fn table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "_,Mode,{}", self.mode);
        let _ = writeln!(out, "_,UseAC1,{}", self.use_ac1 as u8);
        let _ = writeln!(out, "_,UseAC2,{}", self.use_ac2 as u8);
        let _ = writeln!(out, "_,InvertOutput,{}", self.invert_output as u8);
        for id in SensorId::ALL {
            let _ = writeln!(out, "_,{},{}", id.tag(), self.sensor_paths[id.index()].display());
        }
        let p = &self.pins;
        let _ = writeln!(out, "_,PinsAC1,{} {} {}", p.ac1cmp, p.ac1fan, p.ac1v);
        let _ = writeln!(out, "_,PinsAC2,{} {} {}", p.ac2cmp, p.ac2fan, p.ac2v);
        let _ = writeln!(out, "_,PinsComms,{} {} {} {}", p.comms1, p.comms2, p.comms3, p.comms4);
        let _ = writeln!(out, "_,WiCorr,{:.3}", self.wicorr);
        let _ = writeln!(out, "_,WoCorr,{:.3}", self.wocorr);
        let _ = write!(out, "_,TenvCorr,{:.3}", self.tenvcorr);
        out
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Apply every recognized `key=value` line.  Returns whether the file
    /// could be opened at all.
    fn merge_file(&mut self, path: &Path) -> bool {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!("failed to open {} for reading: {e}", path.display());
                return false;
            }
        };

        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            self.apply_key(key, value);
        }
        true
    }

    fn apply_key(&mut self, key: &str, value: &str) {
        // sensor device files
        let sensor = match key {
            "ac1cmp_sensor" => Some(SensorId::Ac1Comp),
            "ac1cnd_sensor" => Some(SensorId::Ac1Cond),
            "he1i_sensor" => Some(SensorId::He1In),
            "he1o_sensor" => Some(SensorId::He1Out),
            "ac2cmp_sensor" => Some(SensorId::Ac2Comp),
            "ac2cnd_sensor" => Some(SensorId::Ac2Cond),
            "he2i_sensor" => Some(SensorId::He2In),
            "he2o_sensor" => Some(SensorId::He2Out),
            "wi_sensor" => Some(SensorId::WaterIn),
            "wo_sensor" => Some(SensorId::WaterOut),
            "tenv_sensor" => Some(SensorId::Env),
            _ => None,
        };
        if let Some(id) = sensor {
            self.sensor_paths[id.index()] = PathBuf::from(value);
            return;
        }

        match key {
            "ac1cmp_pin" => self.pins.ac1cmp = int(value) as u32,
            "ac1fan_pin" => self.pins.ac1fan = int(value) as u32,
            "ac1v_pin" => self.pins.ac1v = int(value) as u32,
            "ac2cmp_pin" => self.pins.ac2cmp = int(value) as u32,
            "ac2fan_pin" => self.pins.ac2fan = int(value) as u32,
            "ac2v_pin" => self.pins.ac2v = int(value) as u32,
            "commspin1_pin" => self.pins.comms1 = int(value) as u32,
            "commspin2_pin" => self.pins.comms2 = int(value) as u32,
            "commspin3_pin" => self.pins.comms3 = int(value) as u32,
            "commspin4_pin" => self.pins.comms4 = int(value) as u32,
            "mode" => self.mode = int(value).clamp(0, u8::MAX as i64) as u8,
            "use_ac1" => self.use_ac1 = int(value) != 0,
            "use_ac2" => self.use_ac2 = int(value) != 0,
            "invert_output" => self.invert_output = int(value) != 0,
            "wicorr" => self.wicorr = float(value),
            "wocorr" => self.wocorr = float(value),
            "tenvcorr" => self.tenvcorr = float(value),
            _ => {} // unknown keys are ignored
        }
    }

    fn validate(&mut self) {
        self.pins.clamp_all();
        if !self.pins.all_unique() {
            warn!("check config - found configured GPIO pin assigned more than once!");
            warn!("the above is an error, switching to default GPIO pin assignment");
            self.pins = Pins::default();
        }
        if self.mode > 8 {
            self.mode = 0;
        }
    }

    fn log_summary(&self, opened: bool) {
        for id in SensorId::ALL {
            info!("{id} temp sensor file: {}", self.sensor_paths[id.index()].display());
        }
        let p = &self.pins;
        info!(
            "using COMMs GPIO pins (BCM mode): comms1: {}, comms2: {}, comms3: {}, comms4: {}",
            p.comms1, p.comms2, p.comms3, p.comms4
        );
        info!(
            "using OUTPUT GPIO pins (BCM mode): AC1 comp: {}, AC1 fan: {}, AC1 valve: {}",
            p.ac1cmp, p.ac1fan, p.ac1v
        );
        info!(
            "using OUTPUT GPIO pins (BCM mode): AC2 comp: {}, AC2 fan: {}, AC2 valve: {}",
            p.ac2cmp, p.ac2fan, p.ac2v
        );
        if self.invert_output {
            info!("OUTPUT GPIO pin control is INVERTED - ON is LOW (0)");
        } else {
            info!("OUTPUT GPIO pin control is STRAIGHT - ON is HIGH (1)");
        }
        let source = if opened { "Read CFG file" } else { "Using values" };
        info!(
            "{source}: Mode={}, use AC1={}, use AC2={}, corrections wi={:.2} wo={:.2} env={:.2}",
            self.mode, self.use_ac1 as u8, self.use_ac2 as u8,
            self.wicorr, self.wocorr, self.tenvcorr
        );
    }
}

/// atoi-style integer parse: optional sign plus leading digits, 0 otherwise.
fn int(s: &str) -> i64 {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(r) => (-1, r),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().map(|v| sign * v).unwrap_or(0)
}

fn float(s: &str) -> f32 {
    s.trim().parse().unwrap_or(0.0)
}
