//! Error kinds and their numeric codes
//!
//! Every layer below the state machine returns these kinds. The Operation
//! layer never propagates them further; it converts any failure into an
//! ABORT status and a safe next phase.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // Logic errors (100s)
    #[error("invalid phase for requested action: {0}")]
    InvalidPhase(&'static str),
    #[error("no targets available for airdrop")]
    NoTargets,
    #[error("altitude {0:.1} m exceeds the {1:.1} m ceiling")]
    InvalidAltitude(f32, f32),
    #[error("no mission queued to send")]
    NoPendingMission,
    #[error("coordinate out of range: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    // Protocol errors (200s)
    #[error("mission upload deadline exceeded")]
    UploadTimeout,
    #[error("command acknowledgement timed out")]
    AckTimeout,
    #[error("unknown flight mode `{0}`")]
    UnknownMode(String),
    #[error("unexpected mission acknowledgement: {0}")]
    UnexpectedAck(String),
    #[error("mission request for out-of-range sequence {0}")]
    BadSequence(u16),
    #[error("autopilot link closed")]
    LinkClosed,
    #[error("autopilot connection failed: {0}")]
    ConnectionFailed(String),

    // Telemetry waits (300s)
    #[error("waypoint {0} not reached in time")]
    WaypointTimeout(u16),
    #[error("landing not confirmed in time")]
    LandedTimeout,
    #[error("RC channel {0} trigger not observed in time")]
    ChannelTimeout(u8),
    #[error("wait cancelled")]
    Cancelled,
    #[error("no heartbeat received from the autopilot")]
    HeartbeatTimeout,

    // Command errors (400s)
    #[error("arm/disarm rejected: {0}")]
    ArmRejected(String),
    #[error("mode change rejected: {0}")]
    ModeRejected(String),
    #[error("servo command rejected: {0}")]
    ServoRejected(String),
    #[error("command rejected: {0}")]
    CommandRejected(String),

    // File errors (500s)
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("file is empty: {}", .0.display())]
    FileEmpty(PathBuf),
    #[error("malformed mission item on line {line}")]
    MalformedItem { line: usize },
    #[error("missing required plan key `{0}`")]
    MissingKey(String),
    #[error("malformed value for plan key `{0}`")]
    MalformedValue(String),
    #[error("waypoint {seq} lies outside the geofence")]
    FenceViolation { seq: u16 },
}

impl Error {
    /// Numeric code for this kind, stable within a run. Higher layers log
    /// the code; `decode_error` maps it back to a description.
    pub fn code(&self) -> u16 {
        match self {
            Error::InvalidPhase(_) => 101,
            Error::NoTargets => 102,
            Error::InvalidAltitude(_, _) => 103,
            Error::NoPendingMission => 104,
            Error::InvalidCoordinate { .. } => 105,

            Error::UploadTimeout => 201,
            Error::AckTimeout => 202,
            Error::UnknownMode(_) => 203,
            Error::UnexpectedAck(_) => 204,
            Error::BadSequence(_) => 205,
            Error::LinkClosed => 206,
            Error::ConnectionFailed(_) => 207,

            Error::WaypointTimeout(_) => 301,
            Error::LandedTimeout => 302,
            Error::ChannelTimeout(_) => 303,
            Error::Cancelled => 304,
            Error::HeartbeatTimeout => 305,

            Error::ArmRejected(_) => 401,
            Error::ModeRejected(_) => 402,
            Error::ServoRejected(_) => 403,
            Error::CommandRejected(_) => 404,

            Error::FileNotFound(_) => 501,
            Error::FileEmpty(_) => 502,
            Error::MalformedItem { .. } => 503,
            Error::MissingKey(_) => 504,
            Error::MalformedValue(_) => 505,
            Error::FenceViolation { .. } => 506,
        }
    }
}

/// Map a numeric error code back to a human-readable description.
pub fn decode_error(code: u16) -> &'static str {
    match code {
        101 => "action invoked in an invalid phase",
        102 => "no targets available for airdrop",
        103 => "altitude exceeds the configured ceiling",
        104 => "no mission queued to send",
        105 => "coordinate out of range",

        201 => "mission upload deadline exceeded",
        202 => "command acknowledgement timed out",
        203 => "unknown flight mode",
        204 => "unexpected mission acknowledgement",
        205 => "mission request for out-of-range sequence",
        206 => "autopilot link closed",
        207 => "autopilot connection failed",

        301 => "waypoint not reached in time",
        302 => "landing not confirmed in time",
        303 => "RC channel trigger not observed in time",
        304 => "wait cancelled",
        305 => "no heartbeat received from the autopilot",

        401 => "arm/disarm rejected",
        402 => "mode change rejected",
        403 => "servo command rejected",
        404 => "command rejected",

        501 => "file not found",
        502 => "file is empty",
        503 => "malformed mission item",
        504 => "missing required plan key",
        505 => "malformed plan value",
        506 => "waypoint lies outside the geofence",

        _ => "unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_stay_in_their_band() {
        assert_eq!(Error::NoTargets.code(), 102);
        assert_eq!(Error::UploadTimeout.code(), 201);
        assert_eq!(Error::ChannelTimeout(7).code(), 303);
        assert_eq!(Error::ArmRejected("denied".into()).code(), 401);
        assert_eq!(Error::MissingKey("home".into()).code(), 504);
    }

    #[test]
    fn decode_matches_code() {
        let err = Error::WaypointTimeout(5);
        assert_eq!(decode_error(err.code()), "waypoint not reached in time");
        assert_eq!(decode_error(9999), "unknown error code");
    }
}
