//! Discrete PID controller linked to caller-owned input, output and setpoint cells.
//!
//! - Uses `f32` math
//! - Self-throttles to a sample period measured on a [`Clock`]
//! - Output clamped to configured limits (default 0..255)
//! - Integral anti-windup via accumulator clamping
//! - Derivative-on-measurement, optional proportional-on-measurement
//! - Bump-less transfer when switching from Manual to Automatic
//!
//! Example
//! ```
//! use core::cell::Cell;
//! use linked_pid::{Direction, Link, ManualClock, Mode, Pid};
//!
//! let input = Cell::new(40.0);
//! let output = Cell::new(0.0);
//! let setpoint = Cell::new(100.0);
//! let clock = ManualClock::new(0);
//!
//! let link = Link::new(&input, &output, &setpoint);
//! let mut pid = Pid::new(link, 1.0, 0.0, 0.0, Direction::Direct, &clock);
//! pid.set_mode(Mode::Automatic);
//!
//! assert!(pid.compute());
//! assert_eq!(output.get(), 60.0);
//! ```

use core::cell::Cell;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{elapsed_millis, Clock};
use crate::log::{debug, trace, warn};
use crate::{Command, OutputLimits, Status, DEFAULT_OUTPUT_MAX, DEFAULT_OUTPUT_MIN, DEFAULT_SAMPLE_TIME_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Manual,
    Automatic,
}

/// Action of the controller. `Direct` raises the output when the input is
/// below the setpoint, `Reverse` lowers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Direct,
    Reverse,
}

/// Where the proportional term acts.
///
/// `OnMeasurement` folds it into the accumulator as a response to input
/// change, which removes the proportional kick on setpoint steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProportionalMode {
    OnMeasurement,
    OnError,
}

// Numeric codes used by the PID front-end protocol.
impl Mode {
    pub fn code(self) -> u8 {
        match self {
            Mode::Manual => 0,
            Mode::Automatic => 1,
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Mode::Manual),
            1 => Ok(Mode::Automatic),
            other => Err(other),
        }
    }
}

impl Direction {
    pub fn code(self) -> u8 {
        match self {
            Direction::Direct => 0,
            Direction::Reverse => 1,
        }
    }

    fn sign(self) -> f32 {
        match self {
            Direction::Direct => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Direction::Direct),
            1 => Ok(Direction::Reverse),
            other => Err(other),
        }
    }
}

impl ProportionalMode {
    pub fn code(self) -> u8 {
        match self {
            ProportionalMode::OnMeasurement => 0,
            ProportionalMode::OnError => 1,
        }
    }
}

impl TryFrom<u8> for ProportionalMode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ProportionalMode::OnMeasurement),
            1 => Ok(ProportionalMode::OnError),
            other => Err(other),
        }
    }
}

/// Gains in per-second units, as the user entered them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tunings {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Configuration call rejected by the controller. State is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidError {
    NegativeGain,
    NonFiniteGain,
    InvalidSampleTime,
    InvalidOutputLimits,
}

impl fmt::Display for PidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidError::NegativeGain => write!(f, "Gains must not be negative"),
            PidError::NonFiniteGain => write!(f, "Gains must be finite"),
            PidError::InvalidSampleTime => write!(f, "Sample time must be positive"),
            PidError::InvalidOutputLimits => write!(f, "Output limits must be finite with min < max"),
        }
    }
}

/// The three cells a controller is wired to. The caller owns them and may
/// change input and setpoint between updates; the controller writes output
/// while in [`Mode::Automatic`].
#[derive(Debug, Clone, Copy)]
pub struct Link<'a> {
    pub input: &'a Cell<f32>,
    pub output: &'a Cell<f32>,
    pub setpoint: &'a Cell<f32>,
}

impl<'a> Link<'a> {
    pub fn new(input: &'a Cell<f32>, output: &'a Cell<f32>, setpoint: &'a Cell<f32>) -> Self {
        Self {
            input,
            output,
            setpoint,
        }
    }
}

#[derive(Debug)]
pub struct Pid<'a, C: Clock> {
    link: Link<'a>,
    clock: C,

    // Gains as entered
    display: Tunings,

    // Gains scaled to the sample period and signed by direction
    kp: f32,
    ki: f32,
    kd: f32,

    direction: Direction,
    p_mode: ProportionalMode,
    mode: Mode,

    // Output limits
    out_min: f32,
    out_max: f32,

    sample_time_ms: u32,

    // State
    last_time: u64,
    output_sum: f32,
    last_input: f32,
}

impl<'a, C: Clock> Pid<'a, C> {
    /// Create a controller with the proportional term on error.
    /// Starts in Manual with limits [0,255] and a 100 ms sample time.
    pub fn new(link: Link<'a>, kp: f32, ki: f32, kd: f32, direction: Direction, clock: C) -> Self {
        Self::new_with_mode(link, kp, ki, kd, ProportionalMode::OnError, direction, clock)
    }

    pub fn new_with_mode(
        link: Link<'a>,
        kp: f32,
        ki: f32,
        kd: f32,
        p_mode: ProportionalMode,
        direction: Direction,
        clock: C,
    ) -> Self {
        let mut pid = Self {
            link,
            clock,
            display: Tunings::default(),
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            direction: Direction::Direct,
            p_mode,
            mode: Mode::Manual,
            out_min: DEFAULT_OUTPUT_MIN,
            out_max: DEFAULT_OUTPUT_MAX,
            sample_time_ms: DEFAULT_SAMPLE_TIME_MS,
            last_time: 0,
            output_sum: 0.0,
            last_input: 0.0,
        };

        pid.set_controller_direction(direction);
        pid.set_tunings_with_mode(kp, ki, kd, p_mode);

        // First compute is due immediately.
        pid.last_time = pid
            .clock
            .now_millis()
            .wrapping_sub(u64::from(pid.sample_time_ms));
        pid
    }

    /// Builder: set output limits.
    pub fn with_output_limits(mut self, min: f32, max: f32) -> Self {
        self.set_output_limits(min, max);
        self
    }

    /// Builder: set sample time in milliseconds.
    pub fn with_sample_time(mut self, sample_time_ms: u32) -> Self {
        self.set_sample_time(sample_time_ms);
        self
    }

    /// Run one control step if the sample period has elapsed.
    ///
    /// Returns `true` when the output cell was recalculated, `false` when the
    /// controller is in Manual, it is too early, or input or setpoint is not a
    /// finite number.
    pub fn compute(&mut self) -> bool {
        if self.mode == Mode::Manual {
            return false;
        }

        let now = self.clock.now_millis();
        if elapsed_millis(now, self.last_time) < u64::from(self.sample_time_ms) {
            return false;
        }

        let input = self.link.input.get();
        let setpoint = self.link.setpoint.get();
        if !input.is_finite() || !setpoint.is_finite() {
            warn!("Skipping PID update: input={} setpoint={}", input, setpoint);
            return false;
        }

        let error = setpoint - input;
        let d_input = input - self.last_input;

        self.output_sum += self.ki * error;
        if self.p_mode == ProportionalMode::OnMeasurement {
            self.output_sum -= self.kp * d_input;
        }
        self.output_sum = clamp(self.output_sum, self.out_min, self.out_max);

        let mut output = match self.p_mode {
            ProportionalMode::OnError => self.kp * error,
            ProportionalMode::OnMeasurement => 0.0,
        };
        // Derivative on measurement: no kick when the setpoint steps.
        output += self.output_sum - self.kd * d_input;
        let output = clamp(output, self.out_min, self.out_max);
        self.link.output.set(output);

        self.last_input = input;
        self.last_time = now;

        trace!("PID update: error={} sum={} output={}", error, self.output_sum, output);
        true
    }

    /// Switch between Manual and Automatic. Entering Automatic re-seeds the
    /// accumulator from the live output so the actuator does not jump.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Automatic && self.mode == Mode::Manual {
            self.initialize();
        }
        if mode != self.mode {
            debug!("PID mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    fn initialize(&mut self) {
        let output = self.link.output.get();
        self.output_sum = if output.is_finite() {
            clamp(output, self.out_min, self.out_max)
        } else {
            self.out_min
        };

        let input = self.link.input.get();
        if input.is_finite() {
            self.last_input = input;
        }
    }

    /// Change gains, keeping the current proportional mode. Invalid gains are ignored.
    pub fn set_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.set_tunings_with_mode(kp, ki, kd, self.p_mode);
    }

    /// Change gains and proportional mode. Invalid gains are ignored.
    pub fn set_tunings_with_mode(&mut self, kp: f32, ki: f32, kd: f32, p_mode: ProportionalMode) {
        if let Err(e) = self.try_set_tunings_with_mode(kp, ki, kd, p_mode) {
            warn!("Ignoring tunings Kp={} Ki={} Kd={}: {}", kp, ki, kd, e);
        }
    }

    pub fn try_set_tunings(&mut self, kp: f32, ki: f32, kd: f32) -> Result<(), PidError> {
        self.try_set_tunings_with_mode(kp, ki, kd, self.p_mode)
    }

    pub fn try_set_tunings_with_mode(
        &mut self,
        kp: f32,
        ki: f32,
        kd: f32,
        p_mode: ProportionalMode,
    ) -> Result<(), PidError> {
        let gains = [kp, ki, kd];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(PidError::NonFiniteGain);
        }
        if gains.iter().any(|g| *g < 0.0) {
            return Err(PidError::NegativeGain);
        }

        self.p_mode = p_mode;
        self.display = Tunings { kp, ki, kd };
        self.rescale();
        Ok(())
    }

    /// Change the sample period. Zero is ignored.
    pub fn set_sample_time(&mut self, sample_time_ms: u32) {
        if let Err(e) = self.try_set_sample_time(sample_time_ms) {
            warn!("Ignoring sample time {} ms: {}", sample_time_ms, e);
        }
    }

    pub fn try_set_sample_time(&mut self, sample_time_ms: u32) -> Result<(), PidError> {
        if sample_time_ms == 0 {
            return Err(PidError::InvalidSampleTime);
        }
        self.sample_time_ms = sample_time_ms;
        self.rescale();
        Ok(())
    }

    /// Change output limits, clamping the live output and accumulator
    /// right away. Ignored unless `min < max`.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        if let Err(e) = self.try_set_output_limits(min, max) {
            warn!("Ignoring output limits [{}, {}]: {}", min, max, e);
        }
    }

    pub fn try_set_output_limits(&mut self, min: f32, max: f32) -> Result<(), PidError> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(PidError::InvalidOutputLimits);
        }
        self.out_min = min;
        self.out_max = max;

        self.link
            .output
            .set(clamp(self.link.output.get(), self.out_min, self.out_max));
        self.output_sum = clamp(self.output_sum, self.out_min, self.out_max);
        Ok(())
    }

    pub fn set_controller_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            debug!("PID direction {:?} -> {:?}", self.direction, direction);
            self.direction = direction;
            self.rescale();
        }
    }

    /// Apply a front-end command. Fields are applied in the order direction,
    /// tunings, sample time, output limits, mode; the first rejected field
    /// stops the rest.
    pub fn apply(&mut self, command: &Command) -> Result<(), PidError> {
        if let Some(direction) = command.direction {
            self.set_controller_direction(direction);
        }

        let p_mode = command.proportional_mode.unwrap_or(self.p_mode);
        match command.tunings {
            Some(t) => self.try_set_tunings_with_mode(t.kp, t.ki, t.kd, p_mode)?,
            None if p_mode != self.p_mode => {
                let t = self.display;
                self.try_set_tunings_with_mode(t.kp, t.ki, t.kd, p_mode)?
            }
            None => {}
        }

        if let Some(sample_time_ms) = command.sample_time_ms {
            self.try_set_sample_time(sample_time_ms)?;
        }
        if let Some(limits) = command.output_limits {
            self.try_set_output_limits(limits.min, limits.max)?;
        }
        if let Some(mode) = command.mode {
            self.set_mode(mode);
        }
        Ok(())
    }

    // Always rebuilt from the display values, never scaled in place.
    fn rescale(&mut self) {
        let sample_time_s = self.sample_time_ms as f32 / 1000.0;
        let sign = self.direction.sign();

        self.kp = sign * self.display.kp;
        self.ki = sign * self.display.ki * sample_time_s;
        self.kd = sign * self.display.kd / sample_time_s;
    }

    pub fn kp(&self) -> f32 {
        self.display.kp
    }

    pub fn ki(&self) -> f32 {
        self.display.ki
    }

    pub fn kd(&self) -> f32 {
        self.display.kd
    }

    pub fn tunings(&self) -> Tunings {
        self.display
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn proportional_mode(&self) -> ProportionalMode {
        self.p_mode
    }

    pub fn sample_time_ms(&self) -> u32 {
        self.sample_time_ms
    }

    /// Current `(min, max)` output limits.
    pub fn output_limits(&self) -> (f32, f32) {
        (self.out_min, self.out_max)
    }

    pub fn status(&self) -> Status {
        Status {
            setpoint: self.link.setpoint.get(),
            input: self.link.input.get(),
            output: self.link.output.get(),
            kp: self.display.kp,
            ki: self.display.ki,
            kd: self.display.kd,
            mode: self.mode,
            direction: self.direction,
            proportional_mode: self.p_mode,
            sample_time_ms: self.sample_time_ms,
            output_limits: OutputLimits {
                min: self.out_min,
                max: self.out_max,
            },
        }
    }
}

#[inline]
fn clamp(x: f32, min: f32, max: f32) -> f32 {
    if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}
