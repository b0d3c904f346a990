#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "defmt")]
pub use defmt as log;

#[cfg(not(feature = "defmt"))]
pub use log;

pub mod clock;
pub mod frontend;
pub mod pid;

#[cfg(feature = "std")]
pub mod clock_std;
#[cfg(feature = "std")]
pub use clock_std::StdClock;

#[cfg(feature = "embassy")]
pub mod clock_embassy;
#[cfg(feature = "embassy")]
pub use clock_embassy::EmbassyClock;

pub use clock::{Clock, ManualClock};
pub use pid::{Direction, Link, Mode, Pid, PidError, ProportionalMode, Tunings};

pub static VERSION: &str = "1.2.1";
pub const DEFAULT_SAMPLE_TIME_MS: u32 = 100;
pub const DEFAULT_OUTPUT_MIN: f32 = 0.0;
pub const DEFAULT_OUTPUT_MAX: f32 = 255.0;

use serde::{Deserialize, Serialize};

/// Snapshot of a controller as shown by a tuning front-end.
///
/// Gains are the values the user entered, not the sample-time scaled ones
/// the control law runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub setpoint: f32,
    pub input: f32,
    pub output: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub mode: Mode,
    pub direction: Direction,
    pub proportional_mode: ProportionalMode,
    pub sample_time_ms: u32,
    pub output_limits: OutputLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputLimits {
    pub min: f32,
    pub max: f32,
}

/// Configuration change requested by a front-end. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub mode: Option<Mode>,
    pub tunings: Option<Tunings>,
    pub proportional_mode: Option<ProportionalMode>,
    pub direction: Option<Direction>,
    pub sample_time_ms: Option<u32>,
    pub output_limits: Option<OutputLimits>,
}
