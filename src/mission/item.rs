//! Mission Items
//!
//! Typed waypoint records with explicit mapping to the wire numbers used by
//! the text mission format and by MISSION_ITEM_INT. Commands outside the
//! supported set are rejected at load time rather than forwarded blindly to
//! the autopilot.

use crate::error::Result;
use crate::geo::Coordinate;
use mavlink::ardupilotmega::{MavCmd, MavFrame, MavMissionType, MISSION_ITEM_INT_DATA};

/// Coordinate frame of a mission item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Absolute altitude (MSL).
    Global,
    /// Altitude relative to home.
    RelativeHome,
    /// No coordinate; parameters only (DO_JUMP targets etc.).
    Mission,
}

impl Frame {
    pub fn from_wpl(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Frame::Global),
            2 => Some(Frame::Mission),
            3 => Some(Frame::RelativeHome),
            _ => None,
        }
    }

    pub fn to_wpl(self) -> u8 {
        match self {
            Frame::Global => 0,
            Frame::Mission => 2,
            Frame::RelativeHome => 3,
        }
    }

    /// Frame for the `_INT` wire encoding.
    pub fn to_mav(self) -> MavFrame {
        match self {
            Frame::Global => MavFrame::MAV_FRAME_GLOBAL_INT,
            Frame::Mission => MavFrame::MAV_FRAME_MISSION,
            Frame::RelativeHome => MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
        }
    }
}

/// The mission commands this controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionCommand {
    Waypoint,
    LoiterTurns,
    LoiterTime,
    ReturnToLaunch,
    Land,
    Takeoff,
    DoJump,
    DoSetServo,
    DoLandStart,
    FenceReturnPoint,
    FencePolygonVertexInclusion,
    FencePolygonVertexExclusion,
}

impl MissionCommand {
    pub fn from_wpl(raw: u16) -> Option<Self> {
        match raw {
            16 => Some(Self::Waypoint),
            18 => Some(Self::LoiterTurns),
            19 => Some(Self::LoiterTime),
            20 => Some(Self::ReturnToLaunch),
            21 => Some(Self::Land),
            22 => Some(Self::Takeoff),
            177 => Some(Self::DoJump),
            183 => Some(Self::DoSetServo),
            189 => Some(Self::DoLandStart),
            5000 => Some(Self::FenceReturnPoint),
            5001 => Some(Self::FencePolygonVertexInclusion),
            5002 => Some(Self::FencePolygonVertexExclusion),
            _ => None,
        }
    }

    pub fn to_wpl(self) -> u16 {
        match self {
            Self::Waypoint => 16,
            Self::LoiterTurns => 18,
            Self::LoiterTime => 19,
            Self::ReturnToLaunch => 20,
            Self::Land => 21,
            Self::Takeoff => 22,
            Self::DoJump => 177,
            Self::DoSetServo => 183,
            Self::DoLandStart => 189,
            Self::FenceReturnPoint => 5000,
            Self::FencePolygonVertexInclusion => 5001,
            Self::FencePolygonVertexExclusion => 5002,
        }
    }

    pub fn to_mav(self) -> MavCmd {
        match self {
            Self::Waypoint => MavCmd::MAV_CMD_NAV_WAYPOINT,
            Self::LoiterTurns => MavCmd::MAV_CMD_NAV_LOITER_TURNS,
            Self::LoiterTime => MavCmd::MAV_CMD_NAV_LOITER_TIME,
            Self::ReturnToLaunch => MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
            Self::Land => MavCmd::MAV_CMD_NAV_LAND,
            Self::Takeoff => MavCmd::MAV_CMD_NAV_TAKEOFF,
            Self::DoJump => MavCmd::MAV_CMD_DO_JUMP,
            Self::DoSetServo => MavCmd::MAV_CMD_DO_SET_SERVO,
            Self::DoLandStart => MavCmd::MAV_CMD_DO_LAND_START,
            Self::FenceReturnPoint => MavCmd::MAV_CMD_NAV_FENCE_RETURN_POINT,
            Self::FencePolygonVertexInclusion => {
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION
            }
            Self::FencePolygonVertexExclusion => {
                MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION
            }
        }
    }

    /// Navigation commands carry a coordinate payload; DO_ commands carry
    /// parameters only.
    pub fn is_nav(self) -> bool {
        !matches!(self, Self::DoJump | Self::DoSetServo | Self::DoLandStart)
    }
}

/// One step of an autopilot plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionItem {
    pub seq: u16,
    pub current: u8,
    pub frame: Frame,
    pub command: MissionCommand,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    pub autocontinue: u8,
}

impl MissionItem {
    /// A navigation item at `coord` with zeroed parameters.
    pub fn nav(seq: u16, command: MissionCommand, coord: &Coordinate) -> Self {
        Self {
            seq,
            current: 0,
            frame: Frame::RelativeHome,
            command,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            lat: coord.lat(),
            lon: coord.lon(),
            alt: coord.alt(),
            autocontinue: 1,
        }
    }

    /// A DO_SET_SERVO item for `servo` at `pwm`.
    pub fn set_servo(seq: u16, servo: u8, pwm: u16) -> Self {
        Self {
            seq,
            current: 0,
            frame: Frame::Mission,
            command: MissionCommand::DoSetServo,
            param1: servo as f32,
            param2: pwm as f32,
            param3: 0.0,
            param4: 0.0,
            lat: 0.0,
            lon: 0.0,
            alt: 0.0,
            autocontinue: 1,
        }
    }

    /// The coordinate payload of a navigation item.
    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::new(self.lat, self.lon, self.alt)
    }

    pub fn set_coordinate(&mut self, coord: &Coordinate) {
        self.lat = coord.lat();
        self.lon = coord.lon();
        self.alt = coord.alt();
    }

    /// Encode for the request/response upload. `current` is supplied by the
    /// caller so the first uploaded item (and only it) is marked current.
    pub fn to_wire(
        &self,
        current: u8,
        mission_type: MavMissionType,
        target_system: u8,
        target_component: u8,
    ) -> MISSION_ITEM_INT_DATA {
        MISSION_ITEM_INT_DATA {
            target_system,
            target_component,
            seq: self.seq,
            frame: self.frame.to_mav(),
            command: self.command.to_mav(),
            current,
            autocontinue: self.autocontinue,
            param1: self.param1,
            param2: self.param2,
            param3: self.param3,
            param4: self.param4,
            x: (self.lat * 1e7) as i32,
            y: (self.lon * 1e7) as i32,
            z: self.alt,
            mission_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_wire_numbers_round_trip() {
        for raw in [0u8, 2, 3] {
            let frame = Frame::from_wpl(raw).unwrap();
            assert_eq!(frame.to_wpl(), raw);
        }
        assert!(Frame::from_wpl(7).is_none());
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(MissionCommand::from_wpl(300).is_none());
        assert_eq!(
            MissionCommand::from_wpl(183),
            Some(MissionCommand::DoSetServo)
        );
        assert!(!MissionCommand::DoSetServo.is_nav());
        assert!(MissionCommand::Waypoint.is_nav());
    }

    #[test]
    fn wire_encoding_scales_coordinates() {
        let coord = Coordinate::new(38.3152762, -76.5490833, 45.0).unwrap();
        let item = MissionItem::nav(3, MissionCommand::Waypoint, &coord);
        let wire = item.to_wire(0, MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        assert_eq!(wire.x, 383152762);
        assert_eq!(wire.y, -765490833);
        assert_eq!(wire.seq, 3);
        assert_eq!(wire.command, MavCmd::MAV_CMD_NAV_WAYPOINT);
    }
}
