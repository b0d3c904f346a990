//! JSON messages exchanged with a tuning front-end.
//!
//! The front-end polls [`Status`] snapshots and sends [`Command`]s back.
//! Both are encoded with `serde-json-core` so this works without an allocator.

use core::fmt;

use heapless::Vec;

use crate::clock::Clock;
use crate::log::warn;
use crate::pid::{Pid, PidError};
use crate::{Command, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrontendError {
    BufferFull,
    Malformed,
    Rejected(PidError),
}

impl fmt::Display for FrontendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontendError::BufferFull => write!(f, "Status does not fit the buffer"),
            FrontendError::Malformed => write!(f, "Malformed command"),
            FrontendError::Rejected(e) => write!(f, "Command rejected: {}", e),
        }
    }
}

impl From<PidError> for FrontendError {
    fn from(e: PidError) -> Self {
        FrontendError::Rejected(e)
    }
}

pub fn encode_status<const N: usize>(status: &Status) -> Result<Vec<u8, N>, FrontendError> {
    serde_json_core::to_vec(status).map_err(|_| FrontendError::BufferFull)
}

pub fn decode_command(bytes: &[u8]) -> Result<Command, FrontendError> {
    let (command, _) = serde_json_core::from_slice::<Command>(bytes).map_err(|_| {
        warn!("Could not parse front-end command");
        FrontendError::Malformed
    })?;
    Ok(command)
}

/// Decode a command, apply it to `pid` and return the resulting status.
pub fn handle_command<C: Clock, const N: usize>(
    pid: &mut Pid<'_, C>,
    bytes: &[u8],
) -> Result<Vec<u8, N>, FrontendError> {
    let command = decode_command(bytes)?;
    pid.apply(&command)?;
    encode_status(&pid.status())
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::clock::ManualClock;
    use crate::pid::{Direction, Link, Mode, ProportionalMode, Tunings};
    use crate::OutputLimits;

    #[test]
    fn decodes_partial_command() {
        let json = br#"{"mode":"Automatic","tunings":{"kp":2.0,"ki":0.5,"kd":0.0}}"#;
        let command = decode_command(json).unwrap();

        assert_eq!(command.mode, Some(Mode::Automatic));
        assert_eq!(
            command.tunings,
            Some(Tunings {
                kp: 2.0,
                ki: 0.5,
                kd: 0.0
            })
        );
        assert_eq!(command.direction, None);
        assert_eq!(command.sample_time_ms, None);
    }

    #[test]
    fn decodes_limits_and_direction() {
        let json = br#"{"direction":"Reverse","output_limits":{"min":-5.0,"max":5.0},"sample_time_ms":250}"#;
        let command = decode_command(json).unwrap();

        assert_eq!(command.direction, Some(Direction::Reverse));
        assert_eq!(command.output_limits, Some(OutputLimits { min: -5.0, max: 5.0 }));
        assert_eq!(command.sample_time_ms, Some(250));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode_command(b"{\"mode\":"), Err(FrontendError::Malformed));
        assert_eq!(
            decode_command(br#"{"mode":"Sideways"}"#),
            Err(FrontendError::Malformed)
        );
    }

    #[test]
    fn status_reports_enums_by_name() {
        let (i, o, s) = (Cell::new(1.0), Cell::new(2.0), Cell::new(3.0));
        let clock = ManualClock::new(0);
        let pid = Pid::new(Link::new(&i, &o, &s), 1.0, 0.0, 0.0, Direction::Direct, &clock);

        let bytes = encode_status::<512>(&pid.status()).unwrap();
        let text = core::str::from_utf8(&bytes).unwrap();
        assert!(text.contains(r#""mode":"Manual""#));
        assert!(text.contains(r#""direction":"Direct""#));
        assert!(text.contains(r#""proportional_mode":"OnError""#));
        assert!(text.contains(r#""sample_time_ms":100"#));
    }

    #[test]
    fn status_too_big_for_buffer() {
        let (i, o, s) = (Cell::new(1.0), Cell::new(2.0), Cell::new(3.0));
        let clock = ManualClock::new(0);
        let pid = Pid::new(Link::new(&i, &o, &s), 1.0, 0.0, 0.0, Direction::Direct, &clock);

        assert_eq!(
            encode_status::<8>(&pid.status()),
            Err(FrontendError::BufferFull)
        );
    }

    #[test]
    fn handle_command_applies_and_reports() {
        let (i, o, s) = (Cell::new(0.0), Cell::new(0.0), Cell::new(0.0));
        let clock = ManualClock::new(0);
        let mut pid = Pid::new(Link::new(&i, &o, &s), 1.0, 0.0, 0.0, Direction::Direct, &clock);

        let json = br#"{"proportional_mode":"OnMeasurement","mode":"Automatic"}"#;
        let reply = handle_command::<_, 512>(&mut pid, json).unwrap();
        assert!(core::str::from_utf8(&reply)
            .unwrap()
            .contains(r#""mode":"Automatic""#));
        assert_eq!(pid.proportional_mode(), ProportionalMode::OnMeasurement);

        let bad = br#"{"tunings":{"kp":-1.0,"ki":0.0,"kd":0.0}}"#;
        assert_eq!(
            handle_command::<_, 512>(&mut pid, bad),
            Err(FrontendError::Rejected(PidError::NegativeGain))
        );
    }
}
