//! Report sinks: data log, current-value table, JSON snapshot.
//!
//! Three consumers, three formats, all refreshed once per tick after the
//! warm-up window:
//!
//! * a human-greppable line appended to the data log,
//! * a `_,NAME,value` table overwritten in place for collectd-style
//!   scrapers,
//! * a single-line JSON object overwritten in place for emoncms/MQTT
//!   bridges.
//!
//! The table and JSON files are rewritten whole and closed each tick, so
//! readers always see one consistent tick.  Failures here are logged and
//! ridden out — reporting must never take the control loop down.

use std::fmt::Write as _;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;

use crate::app::service::Supervisor;
use crate::clock::WallStamp;
use crate::comms::{Command, Response};
use crate::config::Config;
use crate::logging;
use crate::sensors::SensorId;
use crate::unit::{Actuator, Mode, Unit};

/// Default sink locations (tmpfs for the per-tick rewrites).
pub const DATA_FILE: &str = "/run/shm/hpmd_data.log";
pub const TABLE_FILE: &str = "/run/shm/hpmd_current";
pub const JSON_FILE: &str = "/run/shm/hpmd_current_json";
pub const CFG_TABLE_FILE: &str = "/run/shm/hpmd_cur_cfg";

pub struct Reporter {
    data_path: PathBuf,
    table_path: PathBuf,
    json_path: PathBuf,
    cfg_table_path: PathBuf,
}

impl Reporter {
    pub fn new(data: &Path, table: &Path, json: &Path, cfg_table: &Path) -> Self {
        Self {
            data_path: data.to_path_buf(),
            table_path: table.to_path_buf(),
            json_path: json.to_path_buf(),
            cfg_table_path: cfg_table.to_path_buf(),
        }
    }

    /// Refresh all three per-tick sinks.
    pub fn report(&self, sup: &Supervisor, stamp: WallStamp) {
        let snap = Snapshot::collect(sup, stamp);

        let line = logging::stamped(&snap.data_line());
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.data_path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = appended {
            warn!("data log write failed: {e}");
        }

        if let Err(e) = fs::write(&self.table_path, snap.table()) {
            warn!("table write failed: {e}");
        }

        match serde_json::to_string(&snap.json()) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.json_path, json) {
                    warn!("JSON snapshot write failed: {e}");
                }
            }
            Err(e) => warn!("JSON snapshot encode failed: {e}"),
        }
    }

    /// Overwrite the current-config sink; called after every (re)parse.
    pub fn report_config(&self, cfg: &Config) {
        if let Err(e) = fs::write(&self.cfg_table_path, cfg.table()) {
            warn!("config table write failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything the sinks need, captured in one place so all three formats
/// describe the same tick.
struct Snapshot {
    temps: [f32; crate::sensors::SENSOR_COUNT],
    modes: [Mode; 2],
    got: [[bool; 3]; 2],
    want: [[bool; 3]; 2],
    command: Command,
    response: Response,
    run_cycles: [u64; 2],
    stamp: WallStamp,
}

impl Snapshot {
    fn collect(sup: &Supervisor, stamp: WallStamp) -> Self {
        let mut temps = [0.0; crate::sensors::SENSOR_COUNT];
        for id in SensorId::ALL {
            temps[id.index()] = sup.temperature(id);
        }
        let mut modes = [Mode::Off; 2];
        let mut got = [[false; 3]; 2];
        let mut want = [[false; 3]; 2];
        for u in Unit::BOTH {
            let st = sup.unit(u);
            modes[u.index()] = st.mode;
            let req = sup.requested(u);
            for a in Actuator::ALL {
                got[u.index()][a.index()] = st.is_on(a);
                want[u.index()][a.index()] = req.get(a);
            }
        }
        Self {
            temps,
            modes,
            got,
            want,
            command: sup.command(),
            response: sup.response(),
            run_cycles: sup.run_cycles(),
            stamp,
        }
    }

    fn t(&self, id: SensorId) -> f32 {
        self.temps[id.index()]
    }

    /// The appended data-log line.
    fn data_line(&self) -> String {
        let mut line = format!(
            "AC1: {:6.3},{:6.3},{:6.3},{:6.3}; AC2: {:6.3},{:6.3},{:6.3},{:6.3}; \
             {:6.3},{:6.3},{:6.3}; MODES: {},{}; CONTROLS:",
            self.t(SensorId::Ac1Comp),
            self.t(SensorId::Ac1Cond),
            self.t(SensorId::He1In),
            self.t(SensorId::He1Out),
            self.t(SensorId::Ac2Comp),
            self.t(SensorId::Ac2Cond),
            self.t(SensorId::He2In),
            self.t(SensorId::He2Out),
            self.t(SensorId::WaterIn),
            self.t(SensorId::WaterOut),
            self.t(SensorId::Env),
            self.modes[0],
            self.modes[1],
        );
        for u in Unit::BOTH {
            for a in Actuator::ALL {
                if self.got[u.index()][a.index()] {
                    let _ = write!(line, " {}", actuator_token(u, a));
                }
            }
        }
        let mut pending = String::new();
        for u in Unit::BOTH {
            for a in Actuator::ALL {
                if self.want[u.index()][a.index()] != self.got[u.index()][a.index()] {
                    let _ = write!(pending, " {}", actuator_token(u, a));
                }
            }
        }
        if !pending.is_empty() {
            let _ = write!(line, "; PENDING:{pending}");
        }
        let _ = write!(
            line,
            "; CMD: {}; RSP: {}",
            self.command, self.response as u8
        );
        line
    }

    /// The overwritten `_,NAME,value` table.
    fn table(&self) -> String {
        let mut out = String::new();
        for id in SensorId::ALL {
            let _ = writeln!(out, "_,{},{:5.3}", id.tag(), self.temps[id.index()]);
        }
        for u in Unit::BOTH {
            let n = u.number();
            let g = &self.got[u.index()];
            let _ = writeln!(out, "_,Comp{n},{}", g[Actuator::Compressor.index()] as u8);
            let _ = writeln!(out, "_,Fan{n},{}", g[Actuator::Fan.index()] as u8);
            let _ = writeln!(out, "_,Valve{n},{}", g[Actuator::Valve.index()] as u8);
            let _ = writeln!(out, "_,Mode{n},{}", self.modes[u.index()]);
        }
        let _ = writeln!(out, "_,Cmd,{}", self.command as u8);
        let _ = writeln!(out, "_,Rsp,{}", self.response as u8);
        let _ = writeln!(out, "_,Hour,{}", self.stamp.hour);
        let _ = write!(out, "_,Month,{}", self.stamp.month);
        out
    }

    fn json(&self) -> JsonSnapshot {
        JsonSnapshot {
            ac1comp: self.t(SensorId::Ac1Comp),
            ac1cnd: self.t(SensorId::Ac1Cond),
            he1i: self.t(SensorId::He1In),
            he1o: self.t(SensorId::He1Out),
            ac2comp: self.t(SensorId::Ac2Comp),
            ac2cnd: self.t(SensorId::Ac2Cond),
            he2i: self.t(SensorId::He2In),
            he2o: self.t(SensorId::He2Out),
            water_in: self.t(SensorId::WaterIn),
            water_out: self.t(SensorId::WaterOut),
            tenv: self.t(SensorId::Env),
            comp1: self.got[0][Actuator::Compressor.index()] as u8,
            fan1: self.got[0][Actuator::Fan.index()] as u8,
            valve1: self.got[0][Actuator::Valve.index()] as u8,
            comp2: self.got[1][Actuator::Compressor.index()] as u8,
            fan2: self.got[1][Actuator::Fan.index()] as u8,
            valve2: self.got[1][Actuator::Valve.index()] as u8,
            mode1: self.modes[0].label(),
            mode2: self.modes[1].label(),
            cmd: self.command as u8,
            rsp: self.response as u8,
            c1_run_cs: self.run_cycles[0],
            c2_run_cs: self.run_cycles[1],
        }
    }
}

fn actuator_token(u: Unit, a: Actuator) -> &'static str {
    match (u, a) {
        (Unit::Ac1, Actuator::Compressor) => "1COMP",
        (Unit::Ac1, Actuator::Fan) => "1FAN",
        (Unit::Ac1, Actuator::Valve) => "1V",
        (Unit::Ac2, Actuator::Compressor) => "2COMP",
        (Unit::Ac2, Actuator::Fan) => "2FAN",
        (Unit::Ac2, Actuator::Valve) => "2V",
    }
}

#[derive(Serialize)]
struct JsonSnapshot {
    #[serde(rename = "AC1COMP")]
    ac1comp: f32,
    #[serde(rename = "AC1CND")]
    ac1cnd: f32,
    #[serde(rename = "HE1I")]
    he1i: f32,
    #[serde(rename = "HE1O")]
    he1o: f32,
    #[serde(rename = "AC2COMP")]
    ac2comp: f32,
    #[serde(rename = "AC2CND")]
    ac2cnd: f32,
    #[serde(rename = "HE2I")]
    he2i: f32,
    #[serde(rename = "HE2O")]
    he2o: f32,
    #[serde(rename = "WaterIN")]
    water_in: f32,
    #[serde(rename = "WaterOUT")]
    water_out: f32,
    #[serde(rename = "Tenv")]
    tenv: f32,
    #[serde(rename = "Comp1")]
    comp1: u8,
    #[serde(rename = "Fan1")]
    fan1: u8,
    #[serde(rename = "Valve1")]
    valve1: u8,
    #[serde(rename = "Comp2")]
    comp2: u8,
    #[serde(rename = "Fan2")]
    fan2: u8,
    #[serde(rename = "Valve2")]
    valve2: u8,
    #[serde(rename = "Mode1")]
    mode1: &'static str,
    #[serde(rename = "Mode2")]
    mode2: &'static str,
    #[serde(rename = "Cmd")]
    cmd: u8,
    #[serde(rename = "Rsp")]
    rsp: u8,
    #[serde(rename = "C1RunCs")]
    c1_run_cs: u64,
    #[serde(rename = "C2RunCs")]
    c2_run_cs: u64,
}
