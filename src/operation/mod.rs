//! Operation State
//!
//! The mission phase plus the orthogonal substate variables, owned by one
//! [`Operation`] for the lifetime of a sortie. Only the state-machine task
//! mutates these; every transition is validated by the driver against the
//! transition table in [`machine`].

pub mod actions;
pub mod machine;

use crate::flight::FlightOps;
use crate::geo::Coordinate;
use crate::perception::{Camera, DetectionZone, TargetDetector};
use crate::plan::MissionPlan;
use std::fmt;

/// Number of payloads carried; a full sortie ends after this many drops.
pub const FULL_PAYLOAD_DROPS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionPhase {
    Preflight,
    TakeoffWait,
    Takeoff,
    Detect,
    Airdrop,
    Landing,
    Complete,
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissionPhase::Preflight => "PREFLIGHT",
            MissionPhase::TakeoffWait => "TAKEOFF_WAIT",
            MissionPhase::Takeoff => "TAKEOFF",
            MissionPhase::Detect => "DETECT",
            MissionPhase::Airdrop => "AIRDROP",
            MissionPhase::Landing => "LANDING",
            MissionPhase::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Idle,
    Flying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightState {
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Incomplete,
    Complete,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirdropState {
    Incomplete,
    Complete,
}

pub struct Operation {
    pub(crate) plan: MissionPlan,
    pub(crate) flight: Box<dyn FlightOps>,
    pub(crate) camera: Box<dyn Camera>,
    pub(crate) detector: Box<dyn TargetDetector>,

    pub(crate) next_phase: MissionPhase,
    pub(crate) flight_state: FlightState,
    pub(crate) status: Status,
    pub(crate) preflight: PreflightState,
    pub(crate) detection: DetectionState,
    pub(crate) airdrops: AirdropState,

    pub(crate) targets: Vec<Coordinate>,
    pub(crate) detect_attempts: u32,
    pub(crate) drop_count: u32,
    pub(crate) max_detect_attempts: u32,

    /// Phases actually executed, in order.
    pub(crate) trace: Vec<MissionPhase>,
}

impl Operation {
    pub fn new(
        plan: MissionPlan,
        flight: Box<dyn FlightOps>,
        camera: Box<dyn Camera>,
        detector: Box<dyn TargetDetector>,
    ) -> Self {
        let max_detect_attempts = plan.max_detect_attempts;
        Self {
            plan,
            flight,
            camera,
            detector,
            next_phase: MissionPhase::Preflight,
            flight_state: FlightState::Idle,
            status: Status::Ok,
            preflight: PreflightState::Incomplete,
            detection: DetectionState::Incomplete,
            airdrops: AirdropState::Incomplete,
            targets: Vec::new(),
            detect_attempts: 0,
            drop_count: 0,
            max_detect_attempts,
            trace: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn drop_count(&self) -> u32 {
        self.drop_count
    }

    pub fn detect_attempts(&self) -> u32 {
        self.detect_attempts
    }

    pub fn targets(&self) -> &[Coordinate] {
        &self.targets
    }

    pub fn phase_trace(&self) -> &[MissionPhase] {
        &self.trace
    }

    pub(crate) fn detection_zone(&self) -> DetectionZone {
        DetectionZone {
            entry: self.plan.detection_entry,
            exit: self.plan.detection_exit,
            width_m: self.plan.detection_width,
        }
    }
}
