//! State Machine Driver
//!
//! Dispatches the per-phase actions until COMPLETE, short-circuits on
//! ABORT, validates every transition the actions produce against the
//! transition table, and pre-queues the mission the next phase needs.
//! Nothing unwinds out of this loop.

use crate::operation::{
    AirdropState, DetectionState, FlightState, MissionPhase, Operation, Status,
};
use tracing::{error, info};

impl Operation {
    /// Run the mission to completion. Returns the final status; COMPLETE
    /// with `Status::Ok` is the only successful outcome.
    pub async fn run(&mut self) -> Status {
        loop {
            let phase = self.next_phase;
            if phase == MissionPhase::Complete {
                break;
            }

            if self.status == Status::Abort {
                match (phase, self.flight_state) {
                    // The landing action still executes under ABORT; the
                    // aircraft has to actually come down.
                    (MissionPhase::Landing, FlightState::Flying) => {
                        info!("{phase}");
                        self.trace.push(phase);
                        self.land().await;
                    }
                    (_, FlightState::Idle) => {
                        self.next_phase = MissionPhase::Complete;
                        continue;
                    }
                    _ => {
                        self.next_phase = MissionPhase::Landing;
                        self.append_next_mission().await;
                        continue;
                    }
                }
            } else {
                info!("{phase}");
                self.trace.push(phase);
                match phase {
                    MissionPhase::Preflight => self.preflight_check().await,
                    MissionPhase::TakeoffWait => self.takeoff_wait().await,
                    MissionPhase::Takeoff => self.takeoff().await,
                    MissionPhase::Detect => self.detect().await,
                    MissionPhase::Airdrop => self.airdrop().await,
                    MissionPhase::Landing => self.land().await,
                    MissionPhase::Complete => unreachable!("loop guard"),
                }
            }

            if !transition_allowed(self, phase, self.next_phase) {
                error!(
                    "state machine error: {phase} -> {} is not a valid transition, aborting",
                    self.next_phase
                );
                self.status = Status::Abort;
                self.next_phase = if self.flight_state == FlightState::Flying {
                    MissionPhase::Landing
                } else {
                    MissionPhase::Complete
                };
            }

            self.append_next_mission().await;
        }

        match self.status {
            Status::Ok => info!("mission complete, {} drop(s) delivered", self.drop_count),
            Status::Abort => error!("mission aborted after {} drop(s)", self.drop_count),
        }
        self.status
    }

    /// Queue the mission the upcoming phase will send, so its
    /// `wait_and_send_next_mission` has a plan ready.
    async fn append_next_mission(&mut self) {
        let result = match self.next_phase {
            MissionPhase::Detect => self.flight.append_mission(&self.plan.detect).await,
            MissionPhase::Airdrop => self.flight.append_airdrop_mission().await,
            MissionPhase::Landing => self.flight.append_landing_mission().await,
            _ => return,
        };
        if let Err(err) = result {
            let code = err.code();
            error!(
                "failed to queue mission for {}: {} (code {code})",
                self.next_phase,
                crate::error::decode_error(code)
            );
            self.status = Status::Abort;
            if self.flight_state == FlightState::Idle {
                self.next_phase = MissionPhase::Complete;
            }
        }
    }
}

/// The transition table. Anything not listed is a state-machine error.
fn transition_allowed(op: &Operation, from: MissionPhase, to: MissionPhase) -> bool {
    use MissionPhase::*;
    match (from, to) {
        (Preflight, TakeoffWait) => op.status == Status::Ok,
        (Preflight, Complete) => op.status == Status::Abort,
        (TakeoffWait, Takeoff) => op.status == Status::Ok,
        (TakeoffWait, Complete) => op.status == Status::Abort,
        (Takeoff, Detect) => {
            op.status == Status::Ok && op.detection == DetectionState::Incomplete
        }
        (Takeoff, Airdrop) => {
            op.status == Status::Ok
                && op.detection == DetectionState::Complete
                && !op.targets.is_empty()
        }
        (Takeoff, Landing) => op.status == Status::Abort,
        (Detect, Airdrop) => !op.targets.is_empty(),
        (Detect, Detect) => op.detect_attempts < op.max_detect_attempts,
        (Detect, Landing) => op.status == Status::Abort,
        (Airdrop, Airdrop) => {
            op.drop_count % 2 == 1 && (op.drop_count as usize) < op.targets.len()
        }
        (Airdrop, Landing) => true,
        (Landing, Complete) => {
            op.airdrops == AirdropState::Complete || op.status == Status::Abort
        }
        (Landing, TakeoffWait) => op.status == Status::Ok,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::flight::FlightOps;
    use crate::geo::Coordinate;
    use crate::operation::PreflightState;
    use crate::perception::{Camera, DetectionZone, TargetDetector};
    use crate::plan::MissionPlan;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_plan() -> MissionPlan {
        MissionPlan {
            takeoff: PathBuf::from("missions/takeoff.txt"),
            land: PathBuf::from("missions/land.txt"),
            geofence: PathBuf::from("missions/fence.txt"),
            detect: PathBuf::from("missions/detect.txt"),
            airdrop: PathBuf::from("missions/airdrop.txt"),
            home: Coordinate::new(38.3152762, -76.5490833, 0.0).unwrap(),
            detect_index: 5,
            airdrop_index: 8,
            trigger_channel: 7,
            trigger_value: 1900,
            trigger_wait_time: 5,
            airdrop_altitude: 45.0,
            detection_entry: Coordinate::new(38.3150, -76.5500, 45.0).unwrap(),
            detection_exit: Coordinate::new(38.3160, -76.5500, 45.0).unwrap(),
            detection_width: 60.0,
            airdrop_servo: 9,
            servo_open_pwm: 1900,
            servo_close_pwm: 1100,
            num_images: 3,
            image_dir: PathBuf::from("."),
            max_detect_attempts: 1,
            manual_release: false,
            targets: Vec::new(),
        }
    }

    fn target(n: u32) -> Coordinate {
        // Spread along the detection corridor.
        Coordinate::new(38.3151 + n as f64 * 0.0002, -76.5500, 45.0).unwrap()
    }

    /// Flight layer that records calls and fails where scripted.
    #[derive(Default)]
    struct ScriptedFlight {
        calls: Arc<Mutex<Vec<&'static str>>>,
        channel_wait_err: Option<Error>,
        takeoff_err: Option<Error>,
        landed_err: Option<Error>,
    }

    impl ScriptedFlight {
        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl FlightOps for ScriptedFlight {
        async fn preflight_check(
            &mut self,
            _landing: &Path,
            _fence: &Path,
            _home: Coordinate,
        ) -> Result<()> {
            self.log("preflight_check");
            Ok(())
        }

        async fn validate_mission(&mut self, _path: &Path) -> Result<()> {
            self.log("validate_mission");
            Ok(())
        }

        async fn takeoff(&mut self, _path: &Path) -> Result<()> {
            self.log("takeoff");
            match self.takeoff_err.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn wait_for_waypoint_reached(
            &mut self,
            _seq: u16,
            _timeout: Duration,
        ) -> Result<()> {
            self.log("wait_for_waypoint_reached");
            Ok(())
        }

        async fn wait_for_landed(&mut self, _timeout: Duration) -> Result<()> {
            self.log("wait_for_landed");
            match self.landed_err.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn wait_for_channel_input(
            &mut self,
            _channel: u8,
            _value: u16,
            _timeout: Duration,
            _tolerance: u16,
        ) -> Result<()> {
            self.log("wait_for_channel_input");
            match self.channel_wait_err.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn append_mission(&mut self, _path: &Path) -> Result<()> {
            self.log("append_mission");
            Ok(())
        }

        async fn append_airdrop_mission(&mut self) -> Result<()> {
            self.log("append_airdrop_mission");
            Ok(())
        }

        async fn append_landing_mission(&mut self) -> Result<()> {
            self.log("append_landing_mission");
            Ok(())
        }

        async fn build_airdrop_mission(
            &mut self,
            _target: Coordinate,
            _template: &Path,
            _target_index: u16,
            _altitude: f32,
            _drop_count: u32,
        ) -> Result<()> {
            self.log("build_airdrop_mission");
            Ok(())
        }

        async fn wait_and_send_next_mission(&mut self) -> Result<()> {
            self.log("wait_and_send_next_mission");
            Ok(())
        }

        async fn jump_to_next_mission_item(&mut self) -> Result<()> {
            self.log("jump_to_next_mission_item");
            Ok(())
        }

        async fn release_payload(&mut self) -> Result<()> {
            self.log("release_payload");
            Ok(())
        }

        async fn prepare_payload_reload(&mut self) -> Result<()> {
            self.log("prepare_payload_reload");
            Ok(())
        }

        async fn disarm(&mut self, _force: bool) -> Result<()> {
            self.log("disarm");
            Ok(())
        }

        async fn set_mode(&mut self, _name: &str) -> Result<()> {
            self.log("set_mode");
            Ok(())
        }
    }

    struct StubCamera;

    #[async_trait]
    impl Camera for StubCamera {
        async fn capture(
            &mut self,
            _count: u32,
            _interval: Duration,
            _dir: &Path,
        ) -> Result<Vec<PathBuf>> {
            Ok(vec![PathBuf::from("frame_0000.jpg")])
        }
    }

    /// Detector returning one scripted result per sweep, empty thereafter.
    struct ScriptedDetector {
        sweeps: VecDeque<Vec<Coordinate>>,
    }

    #[async_trait]
    impl TargetDetector for ScriptedDetector {
        async fn detect(
            &mut self,
            _images: &[PathBuf],
            _zone: &DetectionZone,
        ) -> Result<Vec<Coordinate>> {
            Ok(self.sweeps.pop_front().unwrap_or_default())
        }
    }

    fn operation(
        plan: MissionPlan,
        flight: ScriptedFlight,
        sweeps: Vec<Vec<Coordinate>>,
    ) -> Operation {
        Operation::new(
            plan,
            Box::new(flight),
            Box::new(StubCamera),
            Box::new(ScriptedDetector {
                sweeps: sweeps.into(),
            }),
        )
    }

    use MissionPhase::*;

    #[tokio::test]
    async fn happy_path_single_drop() {
        let mut op = operation(test_plan(), ScriptedFlight::default(), vec![vec![target(1)]]);
        let status = op.run().await;

        assert_eq!(status, Status::Ok);
        assert_eq!(
            op.phase_trace(),
            &[Preflight, TakeoffWait, Takeoff, Detect, Airdrop, Landing]
        );
        assert_eq!(op.drop_count(), 1);
        assert_eq!(op.targets(), &[target(1)]);
        assert_eq!(op.detect_attempts(), 0);
        assert_eq!(op.detection, DetectionState::Complete);
        assert_eq!(op.next_phase, Complete);
    }

    #[tokio::test]
    async fn detection_fails_once_then_succeeds() {
        let mut plan = test_plan();
        plan.max_detect_attempts = 2;
        let mut op = operation(
            plan,
            ScriptedFlight::default(),
            vec![vec![], vec![target(2)]],
        );
        let status = op.run().await;

        assert_eq!(status, Status::Ok);
        assert_eq!(
            op.phase_trace(),
            &[Preflight, TakeoffWait, Takeoff, Detect, Detect, Airdrop, Landing]
        );
        assert_eq!(op.detect_attempts(), 1);
        assert_eq!(op.drop_count(), 1);
    }

    #[tokio::test]
    async fn detection_exhausts_attempts_and_aborts() {
        let mut op = operation(test_plan(), ScriptedFlight::default(), vec![]);
        let status = op.run().await;

        assert_eq!(status, Status::Abort);
        assert_eq!(
            op.phase_trace(),
            &[Preflight, TakeoffWait, Takeoff, Detect, Landing]
        );
        assert_eq!(op.detection, DetectionState::Fail);
        assert_eq!(op.detect_attempts(), 1);
        assert_eq!(op.drop_count(), 0);
    }

    #[tokio::test]
    async fn takeoff_trigger_timeout_completes_on_the_ground() {
        let flight = ScriptedFlight {
            channel_wait_err: Some(Error::ChannelTimeout(7)),
            ..Default::default()
        };
        let mut op = operation(test_plan(), flight, vec![]);
        let status = op.run().await;

        assert_eq!(status, Status::Abort);
        assert_eq!(op.phase_trace(), &[Preflight, TakeoffWait]);
        assert_eq!(op.flight_state, FlightState::Idle);
        assert_eq!(op.drop_count(), 0);
    }

    #[tokio::test]
    async fn mid_flight_abort_lands_first() {
        let flight = ScriptedFlight {
            takeoff_err: Some(Error::ModeRejected("DENIED".into())),
            ..Default::default()
        };
        let mut op = operation(test_plan(), flight, vec![]);
        let status = op.run().await;

        assert_eq!(status, Status::Abort);
        assert_eq!(
            op.phase_trace(),
            &[Preflight, TakeoffWait, Takeoff, Landing]
        );
        // The landing action really ran and brought the aircraft down.
        assert_eq!(op.flight_state, FlightState::Idle);
        assert_eq!(op.next_phase, Complete);
    }

    #[tokio::test]
    async fn four_drop_sortie_relaunches_between_pairs() {
        let targets: Vec<Coordinate> = (0..4).map(target).collect();
        let mut op = operation(
            test_plan(),
            ScriptedFlight::default(),
            vec![targets.clone()],
        );
        let status = op.run().await;

        assert_eq!(status, Status::Ok);
        assert_eq!(
            op.phase_trace(),
            &[
                Preflight, TakeoffWait, Takeoff, Detect, Airdrop, Airdrop, Landing,
                TakeoffWait, Takeoff, Airdrop, Airdrop, Landing
            ]
        );
        assert_eq!(op.drop_count(), 4);
        assert_eq!(op.airdrops, AirdropState::Complete);
    }

    #[tokio::test]
    async fn manual_release_fires_the_servo_after_the_drop_waypoint() {
        let flight = ScriptedFlight::default();
        let calls = flight.calls.clone();
        let mut plan = test_plan();
        plan.manual_release = true;
        let mut op = operation(plan, flight, vec![vec![target(1)]]);
        let status = op.run().await;

        assert_eq!(status, Status::Ok);
        assert_eq!(
            calls
                .lock()
                .unwrap()
                .iter()
                .filter(|&&call| call == "release_payload")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn default_release_stays_with_the_mission_servo_item() {
        let flight = ScriptedFlight::default();
        let calls = flight.calls.clone();
        let mut op = operation(test_plan(), flight, vec![vec![target(1)]]);
        op.run().await;
        assert!(!calls.lock().unwrap().contains(&"release_payload"));
    }

    #[tokio::test]
    async fn landing_failure_aborts_to_complete() {
        let flight = ScriptedFlight {
            landed_err: Some(Error::LandedTimeout),
            ..Default::default()
        };
        let mut op = operation(test_plan(), flight, vec![vec![target(1)]]);
        let status = op.run().await;

        assert_eq!(status, Status::Abort);
        assert_eq!(op.next_phase, Complete);
        assert_eq!(op.drop_count(), 1);
    }

    #[tokio::test]
    async fn preflight_is_idempotent_once_complete() {
        let mut op = operation(test_plan(), ScriptedFlight::default(), vec![]);
        op.preflight = PreflightState::Complete;
        op.preflight_check().await;

        assert_eq!(op.status(), Status::Ok);
        assert_eq!(op.next_phase, TakeoffWait);
    }

    #[test]
    fn transition_table_rejects_unlisted_edges() {
        let op = operation(test_plan(), ScriptedFlight::default(), vec![]);
        assert!(!transition_allowed(&op, Preflight, Detect));
        assert!(!transition_allowed(&op, Landing, Airdrop));
        // AIRDROP needs targets.
        assert!(!transition_allowed(&op, Detect, Airdrop));
        // DETECT retry needs attempts under the budget.
        let mut op = op;
        op.detect_attempts = 1;
        assert!(!transition_allowed(&op, Detect, Detect));
    }
}
