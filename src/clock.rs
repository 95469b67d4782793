//! Tick pacing and wall-clock capture.
//!
//! Every interlock and state-machine timer in the daemon is denominated in
//! ticks, so the loop must land on a fixed 5-second grid: each iteration
//! sleeps `5 s − work_time`.  When the measured work time exceeds the
//! period (NTP step, DST shift, suspended VM), the delta is meaningless —
//! the loop swallows it, naps a fixed second, and picks the grid back up.

use std::time::{Duration, Instant};

use chrono::{Datelike, Local, Timelike};
use log::warn;

/// The control period.
pub const TICK: Duration = Duration::from_secs(5);

/// Nap taken instead of a computed sleep when the clock looks skewed.
const SKEW_NAP: Duration = Duration::from_secs(1);

/// Wall-clock fields captured every 60th tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallStamp {
    /// Hour of day, 0–23.
    pub hour: u8,
    /// Month, 1–12.
    pub month: u8,
}

impl WallStamp {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            hour: now.hour() as u8,
            month: now.month() as u8,
        }
    }
}

/// Busy-compensated fixed-cadence pacer.
pub struct TickClock {
    period: Duration,
}

impl Default for TickClock {
    fn default() -> Self {
        Self { period: TICK }
    }
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to sleep after a tick that started `elapsed` ago.
    fn budget(&self, elapsed: Duration) -> Duration {
        if elapsed > self.period {
            SKEW_NAP
        } else {
            self.period - elapsed
        }
    }

    /// Sleep out the remainder of the tick that began at `started`.
    pub fn pace(&self, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.period {
            warn!(
                "tick took {:.1}s, clock skew suspected - napping {}s",
                elapsed.as_secs_f32(),
                SKEW_NAP.as_secs()
            );
        }
        std::thread::sleep(self.budget(elapsed));
    }
}
