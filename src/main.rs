//! hpmd binary: startup, wiring, and the 5-second control loop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use hpmd::adapters::sysfs_gpio::SysfsGpio;
use hpmd::app::service::Supervisor;
use hpmd::clock::{TickClock, WallStamp};
use hpmd::config::{Config, CONFIG_FILE};
use hpmd::daemon;
use hpmd::error::{exit, Error};
use hpmd::ledger::{RunLedger, LEDGER_FILE};
use hpmd::logging;
use hpmd::report::{Reporter, CFG_TABLE_FILE, DATA_FILE, JSON_FILE, TABLE_FILE};
use hpmd::sensors::onewire::FileSensorBus;

/// Wall-clock hour/month are refreshed every this many ticks (~5 min).
const WALL_STAMP_TICKS: u64 = 60;

#[derive(Parser)]
#[command(name = "hpmd", version, about = "two-unit heat pump supervisory controller")]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Stay in the foreground instead of daemonizing.
    #[arg(long)]
    foreground: bool,
}

fn main() {
    let cli = Cli::parse();

    // Every mandatory file is probed before we detach, so a misconfigured
    // box fails loudly on the console instead of silently in a daemon.
    probe_file(logging::LOG_FILE, exit::LOG_FILE);
    probe_file(DATA_FILE, exit::DATA_FILE);
    probe_file(TABLE_FILE, exit::TABLE_FILE);
    probe_file(JSON_FILE, exit::JSON_FILE);
    probe_file(CFG_TABLE_FILE, exit::CFG_TABLE_FILE);

    let _pid_lock = if cli.foreground {
        daemon::lock_or_exit(Path::new(daemon::PID_FILE))
    } else {
        daemon::daemonize(Path::new(daemon::PID_FILE), Path::new(daemon::RUNNING_DIR))
    };

    if let Err(e) = setup_runtime() {
        eprintln!("hpmd: {e:#}");
        process::exit(exit::LOG_FILE);
    }

    info!("hpmd {} now starting up", env!("CARGO_PKG_VERSION"));
    info!(
        "running in {}, config file {}",
        daemon::RUNNING_DIR,
        cli.config.display()
    );
    info!(
        "PID written to {}, writing data to {}",
        daemon::PID_FILE,
        DATA_FILE
    );
    info!("writing table data for collectd to {TABLE_FILE}");
    info!("run-cycle persistence file {LEDGER_FILE}");

    let mut cfg = Config::default();
    cfg.reload(&cli.config);

    let reporter = Reporter::new(
        Path::new(DATA_FILE),
        Path::new(TABLE_FILE),
        Path::new(JSON_FILE),
        Path::new(CFG_TABLE_FILE),
    );
    reporter.report_config(&cfg);

    let mut gpio = SysfsGpio::new(&cfg);
    if let Err(e) = gpio.export_all() {
        error!("cannot enable GPIO ({e})! aborting run");
        process::exit(exit::GPIO_ENABLE);
    }
    if let Err(e) = gpio.set_directions() {
        error!("cannot set GPIO direction ({e})! aborting run");
        process::exit(exit::GPIO_DIRECTION);
    }
    if let Err(e) = gpio.init_outputs() {
        error!("cannot preset GPIO outputs ({e})! aborting run");
        process::exit(exit::GPIO_DIRECTION);
    }

    let ledger = RunLedger::load(Path::new(LEDGER_FILE));
    let mut bus = FileSensorBus::new(&cfg);
    let mut sup = Supervisor::new(cfg, ledger);
    let clock = TickClock::new();
    let mut stamp = WallStamp::now();

    loop {
        let started = Instant::now();
        if sup.tick_count() % WALL_STAMP_TICKS == 0 {
            stamp = WallStamp::now();
        }

        match sup.tick(&mut bus, &mut gpio) {
            Ok(()) => {}
            Err(Error::SensorLoss(id)) => {
                error!("too many read errors on sensor {id}! stopping");
                sup.flush();
                let code = match gpio.disable_all() {
                    Ok(()) => exit::SENSOR_LOSS,
                    Err(_) => {
                        error!("GPIO disable failed on handling sensor read failures");
                        exit::SENSOR_LOSS_GPIO
                    }
                };
                process::exit(code);
            }
            Err(e) => warn!("{e}"),
        }

        if sup.warmed_up() {
            reporter.report(&sup, stamp);
        }

        // Signal flags are examined here and only here, after reporting,
        // so every transition they cause lands on a tick boundary.
        if daemon::termination_requested() {
            info!("terminate signal caught, stopping");
            sup.flush();
            if gpio.disable_all().is_err() {
                warn!("errors disabling GPIO pins! quitting anyway");
                process::exit(exit::SHUTDOWN_GPIO);
            }
            info!("exiting normally after {} cycles, bye bye", sup.tick_count());
            process::exit(exit::OK);
        }
        if daemon::take_reload_request() {
            info!("re-reading configuration file");
            let mut new_cfg = sup.config().clone();
            new_cfg.reload(&cli.config);
            if new_cfg.pins != sup.config().pins {
                warn!("GPIO pin assignment changed in config; pins need a restart to apply");
                new_cfg.pins = sup.config().pins;
            }
            gpio.set_invert(new_cfg.invert_output);
            bus.set_paths(&new_cfg);
            reporter.report_config(&new_cfg);
            sup.apply_config(new_cfg);
        }

        clock.pace(started);
    }
}

fn setup_runtime() -> anyhow::Result<()> {
    logging::init(Path::new(logging::LOG_FILE)).context("installing file logger")?;
    daemon::install_signal_handlers().context("installing signal handlers")?;
    Ok(())
}

/// Append a probe line, terminating with `code` when the file is not
/// writable.  Runs before daemonization, so the message lands on stderr.
fn probe_file(path: &str, code: i32) {
    let probed = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{}", logging::stamped("***")));
    if let Err(e) = probed {
        eprintln!("hpmd: cannot open the mandatory {path} file needed for operation: {e}");
        process::exit(code);
    }
}
