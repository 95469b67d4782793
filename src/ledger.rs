//! Cumulative run-cycle ledger.
//!
//! One counter per compressor, incremented every tick the compressor is
//! energized.  The pair is what the arbiter's fair-share policy keys on, so
//! it is persisted across restarts: on startup, on termination, and every
//! ten minutes in between (driven by the main loop).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{info, warn};

use crate::error::{Error, Result};
use crate::unit::Unit;

/// Default persistence location.
pub const LEDGER_FILE: &str = "/var/log/hpmd_runcycles";

#[derive(Debug)]
pub struct RunLedger {
    counts: [u64; 2],
    path: PathBuf,
}

impl RunLedger {
    /// Load the ledger, creating the file with zeroed counters when it does
    /// not exist yet.
    pub fn load(path: &Path) -> Self {
        let mut ledger = Self {
            counts: [0, 0],
            path: path.to_path_buf(),
        };
        match fs::read_to_string(path) {
            Ok(text) => {
                for line in text.lines() {
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let Some((key, value)) = line.split_once('=') else {
                        continue;
                    };
                    let value = value.trim().parse::<u64>().unwrap_or(0);
                    match key.trim() {
                        "C1RunCs" => ledger.counts[0] = value,
                        "C2RunCs" => ledger.counts[1] = value,
                        _ => {}
                    }
                }
                info!(
                    "read run-cycle counters: C1RunCs={}, C2RunCs={}",
                    ledger.counts[0], ledger.counts[1]
                );
            }
            Err(e) => {
                warn!("failed to open {} for reading: {e}", path.display());
                info!("creating missing run-cycle persistence file");
                if let Err(e) = ledger.save() {
                    warn!("{e}");
                }
            }
        }
        ledger
    }

    /// In-memory ledger for tests and dry runs.
    pub fn ephemeral() -> Self {
        Self {
            counts: [0, 0],
            path: PathBuf::new(),
        }
    }

    pub fn counts(&self) -> [u64; 2] {
        self.counts
    }

    pub fn count(&self, u: Unit) -> u64 {
        self.counts[u.index()]
    }

    /// Account one tick of compressor runtime.
    pub fn record(&mut self, compressor_on: [bool; 2]) {
        for u in Unit::BOTH {
            if compressor_on[u.index()] {
                self.counts[u.index()] += 1;
            }
        }
    }

    /// Write both counters out, atomically enough for a single-writer file.
    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&self.path)?;
            writeln!(
                f,
                "# hpmd run-cycle persistence file written {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )?;
            writeln!(f, "C1RunCs={}", self.counts[0])?;
            writeln!(f, "C2RunCs={}", self.counts[1])?;
            f.flush()
        };
        write().map_err(Error::Persist)
    }
}
