//! The supervisor — one object owning all decision state, advanced once
//! per tick.
//!
//! ```text
//!  SensorBus ──▶ ┌──────────────────────────────┐
//!                │          Supervisor          │
//!  DigitalIo ◀──▶│ filter · arbiter · unit FSMs │
//!                │ interlocks · driver · codec  │
//!                └──────────────────────────────┘
//! ```
//!
//! The tick is strictly sequential: sensors → filter → command read →
//! arbiter → mode transitions → interlocked driver → counters/ledger →
//! response encode → link write.  Nothing here suspends and nothing here
//! touches the filesystem except through the injected ports, so the whole
//! cycle runs unchanged against mock hardware in the test suite.

use log::{info, warn};

use crate::arbiter::Arbiter;
use crate::comms::{self, Command, Response};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::RunLedger;
use crate::safety::Interlocks;
use crate::sensors::{SensorBank, SensorId};
use crate::unit::{fsm, Actuator, Unit, UnitState, UnitTemps};

use super::ports::{DigitalIo, Line, SensorBus};

/// Persist the run-cycle ledger every this many ticks (~10 min).
pub const PERSIST_TICKS: u64 = 120;
/// Suppress the report sinks for this many startup ticks.
pub const WARMUP_TICKS: u64 = 8;

pub struct Supervisor {
    config: Config,
    sensors: SensorBank,
    units: [UnitState; 2],
    arbiter: Arbiter,
    ledger: RunLedger,
    command: Command,
    response: Response,
    /// Response bits actually on the wire, for diff-only writes.
    written_response: Option<Response>,
    wanted: [bool; 2],
    tick_count: u64,
}

impl Supervisor {
    pub fn new(config: Config, ledger: RunLedger) -> Self {
        let sensors = SensorBank::new(config.wicorr, config.wocorr, config.tenvcorr);
        Self {
            config,
            sensors,
            units: [UnitState::default(), UnitState::default()],
            arbiter: Arbiter::new(),
            ledger,
            command: Command::Busy,
            response: Response::NoChange,
            written_response: None,
            wanted: [false, false],
            tick_count: 0,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.  The only error that escapes is the
    /// fatal sensor-loss escalation; everything else is logged and ridden
    /// out with the previous state.
    pub fn tick(&mut self, bus: &mut impl SensorBus, io: &mut impl DigitalIo) -> Result<()> {
        self.tick_count += 1;

        // 1. Sensors and sanity filter.
        self.sensors.update(bus)?;

        // 2. Command link.
        self.command = self.read_command(io);

        // 3. Arbiter.
        let temps = self.unit_temps();
        let enabled = self.effective_enabled();
        {
            let locks = Interlocks::new(&self.units, temps, enabled, self.command);
            self.wanted =
                self.arbiter
                    .decide(self.command, enabled, self.ledger.counts(), &self.units, &locks);
        }

        // 4. Mode transitions, decided on the pre-tick counters.
        let mut next = [None, None];
        {
            let locks = Interlocks::new(&self.units, temps, enabled, self.command);
            for u in Unit::BOTH {
                next[u.index()] = fsm::next_mode(
                    u,
                    &self.units[u.index()],
                    temps[u.index()],
                    self.wanted[u.index()],
                    &locks,
                );
            }
        }
        for u in Unit::BOTH {
            if let Some(mode) = next[u.index()] {
                info!("AC{}: mode {} -> {}", u.number(), self.units[u.index()].mode, mode);
                self.units[u.index()].set_mode(mode);
            }
        }

        // 5. Driver: push each desired actuator state through its
        //    interlock; only real changes reach the GPIO layer.
        let mut changes: Vec<(Line, bool)> = Vec::with_capacity(6);
        for u in Unit::BOTH {
            let req = fsm::requests(&self.units[u.index()], self.wanted[u.index()], self.command);
            for a in Actuator::ALL {
                let desired = req.get(a);
                if desired == self.units[u.index()].is_on(a) {
                    continue;
                }
                let allowed = Interlocks::new(&self.units, temps, enabled, self.command)
                    .permits(u, a, desired);
                if allowed && self.units[u.index()].apply(a, desired) {
                    changes.push((Line::Relay(u, a), desired));
                }
            }
        }

        // 6. Tick all cycle counters and the run ledger.
        for st in &mut self.units {
            st.advance();
        }
        self.ledger
            .record([self.units[0].compressor_on(), self.units[1].compressor_on()]);
        if self.tick_count % PERSIST_TICKS == 0 {
            if let Err(e) = self.ledger.save() {
                warn!("{e}");
            }
        }

        // 7. Encode the response from the post-driver interlock state.
        let (startable, stoppable) =
            Interlocks::new(&self.units, temps, enabled, self.command).startable_stoppable();
        self.response = comms::encode_response(self.config.mode == 0, startable, stoppable);

        // 8. Mirror changes to the machine: relays first, then the link.
        for (line, on) in changes {
            if let Err(e) = io.write_line(line, on) {
                warn!("relay write failed on {line:?}: {e}");
            }
        }
        self.write_response(io);

        Ok(())
    }

    // ── Configuration reload ──────────────────────────────────

    /// Swap in a re-parsed configuration at the tick boundary.  Sensor
    /// corrections take effect immediately and the filter gets one
    /// raw-seed tick, mirroring startup.
    pub fn apply_config(&mut self, config: Config) {
        self.sensors
            .set_corrections(config.wicorr, config.wocorr, config.tenvcorr);
        self.sensors.schedule_reseed();
        self.config = config;
        info!("configuration applied at tick boundary");
    }

    // ── Shutdown ──────────────────────────────────────────────

    /// Flush persistent state on the way out.
    pub fn flush(&self) {
        if let Err(e) = self.ledger.save() {
            warn!("{e}");
        }
    }

    // ── Queries (reporting and tests) ─────────────────────────

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn warmed_up(&self) -> bool {
        self.tick_count > WARMUP_TICKS
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn unit(&self, u: Unit) -> &UnitState {
        &self.units[u.index()]
    }

    pub fn temperature(&self, id: SensorId) -> f32 {
        self.sensors.get(id)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn response(&self) -> Response {
        self.response
    }

    pub fn wanted(&self) -> [bool; 2] {
        self.wanted
    }

    pub fn run_cycles(&self) -> [u64; 2] {
        self.ledger.counts()
    }

    /// The actuator triple each unit's mode is currently asking for, for
    /// the wanted-vs-got report column.
    pub fn requested(&self, u: Unit) -> fsm::ActuatorRequest {
        fsm::requests(&self.units[u.index()], self.wanted[u.index()], self.command)
    }

    // ── Internal ──────────────────────────────────────────────

    /// Config mode 0 parks the whole installation: no unit is eligible and
    /// the response encoder reports "no change possible".
    fn effective_enabled(&self) -> [bool; 2] {
        if self.config.mode == 0 {
            [false, false]
        } else {
            self.config.enabled()
        }
    }

    fn unit_temps(&self) -> [UnitTemps; 2] {
        [
            UnitTemps {
                comp: self.sensors.get(SensorId::Ac1Comp),
                cond: self.sensors.get(SensorId::Ac1Cond),
            },
            UnitTemps {
                comp: self.sensors.get(SensorId::Ac2Comp),
                cond: self.sensors.get(SensorId::Ac2Cond),
            },
        ]
    }

    fn read_command(&mut self, io: &mut impl DigitalIo) -> Command {
        let bits = (
            io.read_line(Line::CommandBit(0)),
            io.read_line(Line::CommandBit(1)),
        );
        match bits {
            (Ok(b0), Ok(b1)) => Command::from_bits(b0, b1),
            _ => {
                warn!("command link read failed, treating as BUSY");
                Command::Busy
            }
        }
    }

    fn write_response(&mut self, io: &mut impl DigitalIo) {
        if self.written_response == Some(self.response) {
            return;
        }
        let (b0, b1) = self.response.bits();
        let prev = self.written_response.map(Response::bits);
        let mut wrote = Ok(());
        if prev.map_or(true, |(p0, _)| p0 != b0) {
            wrote = io.write_line(Line::ResponseBit(0), b0);
        }
        if wrote.is_ok() && prev.map_or(true, |(_, p1)| p1 != b1) {
            wrote = io.write_line(Line::ResponseBit(1), b1);
        }
        match wrote {
            Ok(()) => self.written_response = Some(self.response),
            Err(e) => warn!("response link write failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticBus {
        temps: [f32; crate::sensors::SENSOR_COUNT],
    }

    impl StaticBus {
        fn uniform(v: f32) -> Self {
            Self {
                temps: [v; crate::sensors::SENSOR_COUNT],
            }
        }
    }

    impl SensorBus for StaticBus {
        fn read_channel(&mut self, id: SensorId) -> Option<f32> {
            Some(self.temps[id.index()])
        }
    }

    struct RecordingIo {
        command: Command,
        lines: HashMap<Line, bool>,
        writes: Vec<(Line, bool)>,
    }

    impl RecordingIo {
        fn new(command: Command) -> Self {
            Self {
                command,
                lines: HashMap::new(),
                writes: Vec::new(),
            }
        }
    }

    impl DigitalIo for RecordingIo {
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

    fn supervisor() -> Supervisor {
        Supervisor::new(Config::default(), RunLedger::ephemeral())
    }

    #[test]
    fn cold_start_low_brings_up_unit_one_valve_first() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::Low);

        for _ in 0..3 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        assert!(sup.unit(Unit::Ac1).valve_on(), "valve pre-positioned");
        assert!(!sup.unit(Unit::Ac1).compressor_on(), "rest not served yet");

        for _ in 3..96 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        assert!(!sup.unit(Unit::Ac1).compressor_on());

        sup.tick(&mut bus, &mut io).unwrap(); // tick 97
        let u1 = sup.unit(Unit::Ac1);
        assert!(u1.compressor_on());
        assert!(u1.fan_on());
        assert_eq!(u1.mode, crate::unit::Mode::Starting);
        assert!(!sup.unit(Unit::Ac2).compressor_on(), "LOW keeps unit 2 dark");
    }

    #[test]
    fn relay_writes_happen_only_on_change() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::Low);

        for _ in 0..150 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        let mut seen: HashMap<Line, bool> = HashMap::new();
        for (line, on) in &io.writes {
            if let Some(prev) = seen.get(line) {
                assert_ne!(prev, on, "redundant write on {line:?}");
            }
            seen.insert(*line, *on);
        }
    }

    #[test]
    fn battery_command_shuts_both_down_and_parks_valves() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::High);

        for _ in 0..250 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        assert!(sup.unit(Unit::Ac1).compressor_on());
        assert!(sup.unit(Unit::Ac2).compressor_on());

        io.command = Command::Battery;
        for _ in 0..5 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        for u in Unit::BOTH {
            assert!(!sup.unit(u).compressor_on(), "AC{} still compressing", u.number());
            assert!(!sup.unit(u).fan_on());
            assert!(sup.unit(u).valve_on(), "AC{} valve not parked", u.number());
        }
    }

    #[test]
    fn sensor_loss_escalates_out_of_tick() {
        struct DeadComp;
        impl SensorBus for DeadComp {
            fn read_channel(&mut self, id: SensorId) -> Option<f32> {
                (id != SensorId::Ac1Comp).then_some(20.0)
            }
        }
        let mut sup = supervisor();
        let mut bus = DeadComp;
        let mut io = RecordingIo::new(Command::Low);

        let mut failed = false;
        for _ in 0..3 {
            if sup.tick(&mut bus, &mut io).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "startup error budget should escalate a dead sensor fast");
    }

    #[test]
    fn run_ledger_counts_compressor_ticks() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::Low);

        for _ in 0..200 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        let [c1, c2] = sup.run_cycles();
        assert!(c1 > 0, "unit 1 ran");
        assert_eq!(c2, 0, "unit 2 never ran under LOW");
        assert_eq!(c1, 200 - 96, "compressor on from tick 97 onward");
    }

    #[test]
    fn mode_zero_config_parks_everything_and_reports_no_change() {
        let mut cfg = Config::default();
        cfg.mode = 0;
        let mut sup = Supervisor::new(cfg, RunLedger::ephemeral());
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::High);

        for _ in 0..120 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        assert!(!sup.unit(Unit::Ac1).compressor_on());
        assert!(!sup.unit(Unit::Ac2).compressor_on());
        assert_eq!(sup.response(), Response::NoChange);
    }

    #[test]
    fn response_settles_to_can_add_when_units_are_ready() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(25.0);
        let mut io = RecordingIo::new(Command::Busy);

        for _ in 0..100 {
            sup.tick(&mut bus, &mut io).unwrap();
        }
        // both rested and startable, none stoppable
        assert_eq!(sup.response(), Response::CanAdd);
        assert_eq!(io.lines.get(&Line::ResponseBit(0)), Some(&true));
        assert_eq!(io.lines.get(&Line::ResponseBit(1)), Some(&false));
    }

    #[test]
    fn config_reload_reseeds_the_filter() {
        let mut sup = supervisor();
        let mut bus = StaticBus::uniform(20.0);
        let mut io = RecordingIo::new(Command::Busy);
        for _ in 0..10 {
            sup.tick(&mut bus, &mut io).unwrap();
        }

        sup.apply_config(Config::default());
        let mut bus = StaticBus::uniform(45.0); // far outside the clamp band
        sup.tick(&mut bus, &mut io).unwrap();
        assert_eq!(sup.temperature(SensorId::Env), 45.0);
    }
}
