//! End-to-end scenarios for the supervisor → FSM → interlock → driver
//! chain, run on mock hardware from a cold start.

use crate::mock_hw::{MockBus, MockIo};

use hpmd::app::service::Supervisor;
use hpmd::comms::Command;
use hpmd::config::Config;
use hpmd::error::Error;
use hpmd::ledger::RunLedger;
use hpmd::sensors::SensorId;
use hpmd::unit::fsm::defrost_schedule;
use hpmd::unit::{Actuator, Mode, Unit};

fn supervisor() -> Supervisor {
    Supervisor::new(Config::default(), RunLedger::ephemeral())
}

fn run(sup: &mut Supervisor, bus: &mut MockBus, io: &mut MockIo, ticks: u64) {
    for _ in 0..ticks {
        sup.tick(bus, io).expect("no sensor loss expected");
    }
}

// ── S1: cold start under LOW ─────────────────────────────────

#[test]
fn cold_start_low_sequences_unit_one_correctly() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::Low);

    // Filter seeding plus valve pre-positioning.
    run(&mut sup, &mut bus, &mut io, 2);
    assert!(!sup.unit(Unit::Ac1).valve_on(), "valve blocked until settle");
    run(&mut sup, &mut bus, &mut io, 1);
    assert!(sup.unit(Unit::Ac1).valve_on(), "valve on at tick 3");
    assert!(io.relay(Unit::Ac1, Actuator::Valve));

    // Anti-short-cycle rest: no compressor through tick 96.
    run(&mut sup, &mut bus, &mut io, 93);
    assert!(!sup.unit(Unit::Ac1).compressor_on());
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Off);

    // Tick 97: compressor and fan come up, STARTING begins.
    run(&mut sup, &mut bus, &mut io, 1);
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Starting);
    assert!(sup.unit(Unit::Ac1).compressor_on());
    assert!(sup.unit(Unit::Ac1).fan_on());
    assert!(io.relay(Unit::Ac1, Actuator::Compressor));

    // Shell stays cool, so STARTING times out into FIN-STACK-HEATING.
    run(&mut sup, &mut bus, &mut io, 25);
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::FinHeating);
    assert!(sup.unit(Unit::Ac1).fan_on());

    // LOW keeps the second unit dark throughout.
    assert!(!sup.unit(Unit::Ac2).compressor_on());
    assert_eq!(sup.unit(Unit::Ac2).mode, Mode::Off);
}

// ── S2: LOW → HIGH brings the second unit in ─────────────────

#[test]
fn switching_low_to_high_starts_unit_two_staggered() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::Low);
    run(&mut sup, &mut bus, &mut io, 200);
    assert!(sup.unit(Unit::Ac1).compressor_on());
    assert!(!sup.unit(Unit::Ac2).compressor_on());

    io.command = Command::High;
    // valve 2 pre-positions first, then the compressor follows
    run(&mut sup, &mut bus, &mut io, 2);
    assert!(sup.unit(Unit::Ac2).valve_on());
    assert!(!sup.unit(Unit::Ac2).compressor_on());

    run(&mut sup, &mut bus, &mut io, 3);
    assert!(sup.unit(Unit::Ac2).compressor_on(), "unit 2 joined");
    assert_eq!(sup.unit(Unit::Ac2).mode, Mode::Starting);
    assert!(sup.unit(Unit::Ac1).compressor_on(), "unit 1 kept running");
}

// ── S3: defrost trip and the 82-tick schedule ────────────────

#[test]
fn iced_fin_stack_runs_the_full_defrost_schedule() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(30.0);
    bus.set(SensorId::Ac1Cond, -8.0);
    bus.set(SensorId::Ac2Cond, -8.0);
    let mut io = MockIo::new(Command::Low);

    // FIN-STACK-HEATING from tick 122; defrost trips at 160 ticks in.
    run(&mut sup, &mut bus, &mut io, 281);
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::FinHeating);

    run(&mut sup, &mut bus, &mut io, 1);
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Defrost);

    // Every tick of the schedule must land exactly on its band.
    for step in 0..82u64 {
        let expected = defrost_schedule(step);
        let st = sup.unit(Unit::Ac1);
        assert_eq!(st.compressor_on(), expected.compressor, "comp at step {step}");
        assert_eq!(st.fan_on(), expected.fan, "fan at step {step}");
        assert_eq!(st.valve_on(), expected.valve, "valve at step {step}");
        run(&mut sup, &mut bus, &mut io, 1);
    }
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Starting, "schedule complete");
}

// ── S4: overheat protection overrides the minimum-on time ────

#[test]
fn overheat_trips_ohp_and_stops_the_compressor_immediately() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(30.0);
    let mut io = MockIo::new(Command::Low);
    run(&mut sup, &mut bus, &mut io, 99);
    assert!(sup.unit(Unit::Ac1).compressor_on());

    // Shell climbs within the filter's slew band until it crosses 63 °C.
    for t in [35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 64.0] {
        bus.set(SensorId::Ac1Comp, t);
        run(&mut sup, &mut bus, &mut io, 1);
    }
    let st = sup.unit(Unit::Ac1);
    assert_eq!(st.mode, Mode::Ohp);
    assert!(!st.compressor_on(), "OHP is not subject to the minimum-on time");
    assert!(!st.fan_on());
    assert!(!io.relay(Unit::Ac1, Actuator::Compressor));

    // Shell recovers, the dwell runs out, unit returns to OFF.
    for t in [59.0, 54.0, 49.0, 44.0, 40.0] {
        bus.set(SensorId::Ac1Comp, t);
        run(&mut sup, &mut bus, &mut io, 1);
    }
    run(&mut sup, &mut bus, &mut io, 40);
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Off);
}

// ── S5: persistent sensor loss is fatal ──────────────────────

#[test]
fn five_unreadable_ticks_escalate_to_sensor_loss() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::Low);
    run(&mut sup, &mut bus, &mut io, 10);

    bus.kill(SensorId::Ac1Comp);
    let mut outcome = Ok(());
    let mut ticks_to_fail = 0;
    for t in 1..=6 {
        outcome = sup.tick(&mut bus, &mut io);
        if outcome.is_err() {
            ticks_to_fail = t;
            break;
        }
    }
    match outcome {
        Err(Error::SensorLoss(id)) => {
            assert_eq!(id, SensorId::Ac1Comp);
            assert_eq!(ticks_to_fail, 5, "escalates on the fifth bad tick");
        }
        other => panic!("expected sensor loss, got {other:?}"),
    }
}

// ── S6: config reload disabling a running unit ───────────────

#[test]
fn disabling_a_running_unit_respects_the_minimum_on_time() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::Low);
    run(&mut sup, &mut bus, &mut io, 150);
    assert!(sup.unit(Unit::Ac1).compressor_on());

    let mut cfg = Config::default();
    cfg.use_ac1 = false;
    sup.apply_config(cfg);

    // Compressor came up at tick 97 and must run out its 84 ticks.
    run(&mut sup, &mut bus, &mut io, 30);
    assert!(sup.unit(Unit::Ac1).compressor_on(), "still inside minimum-on");

    run(&mut sup, &mut bus, &mut io, 1);
    assert!(!sup.unit(Unit::Ac1).compressor_on(), "released at the interlock");
    assert_eq!(sup.unit(Unit::Ac1).mode, Mode::Off);
}

// ── LOW with both units running sheds exactly one ────────────

#[test]
fn low_command_with_both_running_sheds_the_more_used_unit() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::High);
    run(&mut sup, &mut bus, &mut io, 250);
    assert!(sup.unit(Unit::Ac1).compressor_on());
    assert!(sup.unit(Unit::Ac2).compressor_on());

    // Unit 1 started first, so its ledger reads higher.
    let [c1, c2] = sup.run_cycles();
    assert!(c1 > c2);

    io.command = Command::Low;
    run(&mut sup, &mut bus, &mut io, 5);
    assert!(!sup.unit(Unit::Ac1).compressor_on(), "more-used unit shed");
    assert!(sup.unit(Unit::Ac2).compressor_on(), "less-used unit kept");
}

// ── Battery command parks the whole installation ─────────────

#[test]
fn battery_command_shuts_down_with_valves_in_heating_position() {
    let mut sup = supervisor();
    let mut bus = MockBus::uniform(25.0);
    let mut io = MockIo::new(Command::High);
    run(&mut sup, &mut bus, &mut io, 250);

    io.command = Command::Battery;
    run(&mut sup, &mut bus, &mut io, 5);
    for u in Unit::BOTH {
        let st = sup.unit(u);
        assert!(!st.compressor_on(), "AC{} compressor still on", u.number());
        assert!(!st.fan_on(), "AC{} fan still on", u.number());
        assert!(st.valve_on(), "AC{} valve must park ON", u.number());
    }
}
