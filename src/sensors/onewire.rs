//! 1-Wire sensor files: record parsing and the file-backed bus.
//!
//! A DS18B20 read through the kernel driver yields two text records:
//!
//! ```text
//! 29 01 55 05 7f a5 a5 66 b3 : crc=b3 YES
//! 29 01 55 05 7f a5 a5 66 b3 t=18562
//! ```
//!
//! The first record (CRC status) is discarded; the second carries the
//! temperature as `t=` followed by signed milli-degrees.  Each read blocks
//! for up to ~0.9 s in the driver, which still fits eleven sensors into the
//! 5-second tick with margin.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use log::warn;

use crate::app::ports::SensorBus;
use crate::config::Config;

use super::{SensorId, SENSOR_COUNT};

/// First record: hex dump + CRC status, discarded.
const FIRST_RECORD_LEN: usize = 39;
/// Second record: hex dump + `t=` payload.
const SECOND_RECORD_LEN: usize = 35;

/// Extract the milli-degree payload from the second record.
///
/// Tolerates any prefix; everything after `=` up to the first non-digit is
/// parsed as a signed integer.
pub fn parse_record(record: &[u8]) -> Option<f32> {
    let text = std::str::from_utf8(record).ok()?;
    let (_, suffix) = text.split_once('=')?;
    let digits: &str = {
        let mut end = 0;
        for (i, c) in suffix.char_indices() {
            if c == '-' && i == 0 {
                end = 1;
                continue;
            }
            if c.is_ascii_digit() {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        &suffix[..end]
    };
    let milli: i64 = digits.parse().ok()?;
    Some(milli as f32 / 1000.0)
}

// ---------------------------------------------------------------------------
// File-backed bus
// ---------------------------------------------------------------------------

/// [`SensorBus`] implementation reading the w1 sysfs device files.
pub struct FileSensorBus {
    paths: [PathBuf; SENSOR_COUNT],
}

impl FileSensorBus {
    pub fn new(cfg: &Config) -> Self {
        Self {
            paths: cfg.sensor_paths.clone(),
        }
    }

    /// Swap in new device paths after a configuration reload.
    pub fn set_paths(&mut self, cfg: &Config) {
        self.paths = cfg.sensor_paths.clone();
    }

    fn read_file(&self, id: SensorId) -> std::io::Result<Option<f32>> {
        let mut file = File::open(&self.paths[id.index()])?;
        let mut first = [0u8; FIRST_RECORD_LEN];
        let _ = file.read(&mut first)?;
        let mut second = [0u8; SECOND_RECORD_LEN];
        let n = file.read(&mut second)?;
        Ok(parse_record(&second[..n]))
    }
}

impl SensorBus for FileSensorBus {
    fn read_channel(&mut self, id: SensorId) -> Option<f32> {
        match self.read_file(id) {
            Ok(Some(v)) => Some(v),
            Ok(None) => {
                warn!("sensor {id}: no temperature record in {:?}", self.paths[id.index()]);
                None
            }
            Err(e) => {
                warn!("sensor {id}: {e} reading {:?}", self.paths[id.index()]);
                None
            }
        }
    }
}
