//! Sensor channel table and sanity filter.
//!
//! Eleven DS18B20 channels are read once per tick through the
//! [`SensorBus`](crate::app::ports::SensorBus) port.  Raw readings pass a
//! plausibility filter before anything downstream sees them:
//!
//! * a reading more than `2 × MAX_TEMP_DIFF` away from the last accepted
//!   value is counted as BAD — the previous value is kept and the channel's
//!   error counter increments;
//! * a reading between `1 ×` and `2 × MAX_TEMP_DIFF` away is clamped to
//!   `previous ± MAX_TEMP_DIFF`;
//! * a failed read keeps the previous value and increments the counter.
//!
//! A successful in-range read decrements the counter again.  Any counter
//! exceeding [`MAX_READ_ERRORS`] is fatal for the whole process: the
//! compressor-temperature interlocks cannot be trusted on stale data.

pub mod onewire;

use log::warn;

use crate::app::ports::SensorBus;
use crate::error::{Error, Result};

/// Maximum change accepted between consecutive reads of one channel, °C.
pub const MAX_TEMP_DIFF: f32 = 5.0;

/// Consecutive-error threshold; one more than this aborts the process.
pub const MAX_READ_ERRORS: u8 = 4;

/// Channels start life with this many errors on the books, so a sensor that
/// is already dead at startup escalates within two ticks instead of five.
const STARTUP_ERRORS: u8 = 3;

/// Raw seeding window: for this many ticks after startup readings are
/// accepted verbatim and seed the filter history.
const SEED_TICKS: u8 = 3;

/// Sentinel for "never read".
pub const NEVER_READ: f32 = -200.0;

/// Number of temperature channels.
pub const SENSOR_COUNT: usize = 11;

// ---------------------------------------------------------------------------
// Channel identity
// ---------------------------------------------------------------------------

/// The eleven temperature channels, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum SensorId {
    Ac1Comp = 0,
    Ac1Cond = 1,
    He1In = 2,
    He1Out = 3,
    Ac2Comp = 4,
    Ac2Cond = 5,
    He2In = 6,
    He2Out = 7,
    WaterIn = 8,
    WaterOut = 9,
    Env = 10,
}

impl SensorId {
    pub const ALL: [SensorId; SENSOR_COUNT] = [
        Self::Ac1Comp,
        Self::Ac1Cond,
        Self::He1In,
        Self::He1Out,
        Self::Ac2Comp,
        Self::Ac2Cond,
        Self::He2In,
        Self::He2Out,
        Self::WaterIn,
        Self::WaterOut,
        Self::Env,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short channel name as used in the table and JSON sinks.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Ac1Comp => "AC1COMP",
            Self::Ac1Cond => "AC1CND",
            Self::He1In => "HE1I",
            Self::He1Out => "HE1O",
            Self::Ac2Comp => "AC2COMP",
            Self::Ac2Cond => "AC2CND",
            Self::He2In => "HE2I",
            Self::He2Out => "HE2O",
            Self::WaterIn => "WaterIN",
            Self::WaterOut => "WaterOUT",
            Self::Env => "Tenv",
        }
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ac1Comp => "AC1 compressor",
            Self::Ac1Cond => "AC1 condenser",
            Self::He1In => "heat exchanger 1 IN",
            Self::He1Out => "heat exchanger 1 OUT",
            Self::Ac2Comp => "AC2 compressor",
            Self::Ac2Cond => "AC2 condenser",
            Self::He2In => "heat exchanger 2 IN",
            Self::He2Out => "heat exchanger 2 OUT",
            Self::WaterIn => "water IN",
            Self::WaterOut => "water OUT",
            Self::Env => "environment",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Channel state
// ---------------------------------------------------------------------------

/// Filter state for one channel.
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    /// Last accepted reading, °C.
    pub current: f32,
    /// Reading accepted the tick before, °C.
    pub previous: f32,
    /// Consecutive-error counter (saturating).
    pub errors: u8,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            current: NEVER_READ,
            previous: NEVER_READ,
            errors: STARTUP_ERRORS,
        }
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// All eleven channels plus the additive correction offsets.
pub struct SensorBank {
    channels: [Channel; SENSOR_COUNT],
    /// Per-channel correction added after filtering (nonzero only for
    /// water-in, water-out and environment).
    corrections: [f32; SENSOR_COUNT],
    /// Remaining raw-seed ticks.
    just_started: u8,
}

impl SensorBank {
    /// `wi`, `wo`, `env`: correction offsets from the configuration.
    pub fn new(wi: f32, wo: f32, env: f32) -> Self {
        let mut corrections = [0.0; SENSOR_COUNT];
        corrections[SensorId::WaterIn.index()] = wi;
        corrections[SensorId::WaterOut.index()] = wo;
        corrections[SensorId::Env.index()] = env;
        Self {
            channels: [Channel::default(); SENSOR_COUNT],
            corrections,
            just_started: SEED_TICKS,
        }
    }

    /// Update the correction offsets (applied on configuration reload).
    pub fn set_corrections(&mut self, wi: f32, wo: f32, env: f32) {
        self.corrections[SensorId::WaterIn.index()] = wi;
        self.corrections[SensorId::WaterOut.index()] = wo;
        self.corrections[SensorId::Env.index()] = env;
    }

    /// Schedule one raw-seed tick, as after a configuration reload.
    pub fn schedule_reseed(&mut self) {
        self.just_started = self.just_started.max(1);
    }

    /// Filtered reading with the channel correction applied.
    pub fn get(&self, id: SensorId) -> f32 {
        self.channels[id.index()].current + self.corrections[id.index()]
    }

    /// Filtered reading from the tick before, corrected.
    pub fn get_previous(&self, id: SensorId) -> f32 {
        self.channels[id.index()].previous + self.corrections[id.index()]
    }

    pub fn errors(&self, id: SensorId) -> u8 {
        self.channels[id.index()].errors
    }

    /// Read and filter every channel.  Returns [`Error::SensorLoss`] when a
    /// channel crosses the consecutive-error threshold; the caller must shut
    /// the outputs down and exit.
    pub fn update(&mut self, bus: &mut impl SensorBus) -> Result<()> {
        let seeding = self.just_started > 0;

        for id in SensorId::ALL {
            let ch = &mut self.channels[id.index()];
            match bus.read_channel(id) {
                Some(raw) => {
                    ch.errors = ch.errors.saturating_sub(1);
                    if seeding {
                        ch.previous = raw;
                        ch.current = raw;
                        continue;
                    }
                    let last = ch.current;
                    let accepted = if (raw - last).abs() > 2.0 * MAX_TEMP_DIFF {
                        warn!("counting {raw:.3} for sensor {id} as BAD, keeping {last:.3}");
                        ch.errors = ch.errors.saturating_add(1);
                        last
                    } else if raw < last - MAX_TEMP_DIFF {
                        let clamped = last - MAX_TEMP_DIFF;
                        warn!("correcting LOW {raw:.3} for sensor {id} to {clamped:.3}");
                        clamped
                    } else if raw > last + MAX_TEMP_DIFF {
                        let clamped = last + MAX_TEMP_DIFF;
                        warn!("correcting HIGH {raw:.3} for sensor {id} to {clamped:.3}");
                        clamped
                    } else {
                        raw
                    };
                    ch.previous = last;
                    ch.current = accepted;
                }
                None => {
                    ch.errors = ch.errors.saturating_add(1);
                    warn!("sensor {id} read failed, error counter at {}", ch.errors);
                }
            }
        }

        if self.just_started > 0 {
            self.just_started -= 1;
        }

        for id in SensorId::ALL {
            if self.channels[id.index()].errors > MAX_READ_ERRORS {
                return Err(Error::SensorLoss(id));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    struct SeqBus {
        value: Option<f32>,
    }

    impl SensorBus for SeqBus {
        fn read_channel(&mut self, _id: SensorId) -> Option<f32> {
            self.value
        }
    }

    proptest! {
        /// Invariant: after the seed window, consecutive accepted values
        /// never differ by more than MAX_TEMP_DIFF.
        #[test]
        fn filtered_delta_is_bounded(
            seed in -30.0f32..80.0,
            raws in proptest::collection::vec(-60.0f32..140.0, 1..60),
        ) {
            let mut bank = SensorBank::new(0.0, 0.0, 0.0);
            let mut bus = SeqBus { value: Some(seed) };
            for _ in 0..3 {
                bank.update(&mut bus).unwrap();
            }
            for raw in raws {
                bus.value = Some(raw);
                let before = bank.get(SensorId::Ac1Comp);
                // escalation can legitimately fire on long BAD streaks
                if bank.update(&mut bus).is_err() {
                    break;
                }
                let after = bank.get(SensorId::Ac1Comp);
                prop_assert!((after - before).abs() <= MAX_TEMP_DIFF + 1e-4);
            }
        }

        /// Error counters never exceed threshold+1 before escalation fires.
        #[test]
        fn escalation_is_prompt(bad_ticks in 1usize..12) {
            let mut bank = SensorBank::new(0.0, 0.0, 0.0);
            let mut bus = SeqBus { value: Some(20.0) };
            for _ in 0..4 {
                bank.update(&mut bus).unwrap();
            }
            bus.value = None;
            let mut failed = false;
            for _ in 0..bad_ticks {
                if bank.update(&mut bus).is_err() {
                    failed = true;
                    break;
                }
                prop_assert!(bank.errors(SensorId::Ac1Comp) <= MAX_READ_ERRORS);
            }
            if bad_ticks > MAX_READ_ERRORS as usize {
                prop_assert!(failed);
            }
        }
    }
}
