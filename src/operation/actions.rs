//! State Actions
//!
//! One action per mission phase. Each action reads the operation state,
//! drives the flight layer, and writes the next phase plus the substate
//! variables. Failures never propagate: they become an ABORT status and a
//! safe next phase (LANDING while flying, COMPLETE on the ground).

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::operation::{
    AirdropState, DetectionState, FlightState, MissionPhase, Operation, PreflightState, Status,
    FULL_PAYLOAD_DROPS,
};
use std::time::Duration;
use tracing::{error, info, warn};

/// Bound on the detect/airdrop waypoint waits.
const WAYPOINT_WAIT: Duration = Duration::from_secs(100);
/// Bound on the landing confirmation wait.
const LANDED_WAIT: Duration = Duration::from_secs(200);
/// PWM tolerance for the RC takeoff trigger.
const TRIGGER_TOLERANCE: u16 = 100;
/// Detection frames are captured back-to-back.
const CAPTURE_INTERVAL: Duration = Duration::ZERO;

impl Operation {
    /// Abort out of a failed action: land if airborne, finish in place if
    /// not.
    fn abort_with(&mut self, context: &str, err: &Error) {
        error!("{context} failed (code {}): {err}", err.code());
        self.status = Status::Abort;
        self.next_phase = if self.flight_state == FlightState::Flying {
            MissionPhase::Landing
        } else {
            MissionPhase::Complete
        };
    }

    pub(crate) async fn preflight_check(&mut self) {
        if self.preflight == PreflightState::Complete {
            // Already passed; nothing to redo.
            self.next_phase = MissionPhase::TakeoffWait;
            return;
        }
        match self.run_preflight().await {
            Ok(()) => {
                self.preflight = PreflightState::Complete;
                self.next_phase = MissionPhase::TakeoffWait;
            }
            Err(err) => self.abort_with("preflight", &err),
        }
    }

    async fn run_preflight(&mut self) -> Result<()> {
        self.flight
            .preflight_check(&self.plan.land, &self.plan.geofence, self.plan.home)
            .await?;
        self.flight.validate_mission(&self.plan.detect).await?;
        self.flight.validate_mission(&self.plan.airdrop).await?;
        self.flight.validate_mission(&self.plan.takeoff).await?;
        Ok(())
    }

    pub(crate) async fn takeoff_wait(&mut self) {
        let timeout = Duration::from_secs(self.plan.trigger_wait_time);
        match self
            .flight
            .wait_for_channel_input(
                self.plan.trigger_channel,
                self.plan.trigger_value,
                timeout,
                TRIGGER_TOLERANCE,
            )
            .await
        {
            Ok(()) => {
                info!("takeoff trigger received");
                self.next_phase = MissionPhase::Takeoff;
            }
            Err(err) => {
                // Still on the ground; complete in place.
                error!("takeoff trigger failed (code {}): {err}", err.code());
                self.status = Status::Abort;
                self.next_phase = MissionPhase::Complete;
            }
        }
    }

    pub(crate) async fn takeoff(&mut self) {
        // Pessimistic: once takeoff is attempted, treat the aircraft as
        // airborne so any abort routes through LANDING.
        self.flight_state = FlightState::Flying;
        if let Err(err) = self.flight.takeoff(&self.plan.takeoff).await {
            self.abort_with("takeoff", &err);
            return;
        }
        if self.detection == DetectionState::Incomplete {
            self.next_phase = MissionPhase::Detect;
            return;
        }
        let Some(target) = self.targets.get(self.drop_count as usize).copied() else {
            self.abort_with("takeoff", &Error::NoTargets);
            return;
        };
        match self.build_airdrop(target).await {
            Ok(()) => self.next_phase = MissionPhase::Airdrop,
            Err(err) => self.abort_with("airdrop synthesis", &err),
        }
    }

    pub(crate) async fn detect(&mut self) {
        match self.run_detection().await {
            Err(err) => self.abort_with("detect", &err),
            Ok(targets) if !targets.is_empty() => {
                info!("{} target(s) located", targets.len());
                self.targets = targets;
                let target = self.targets[self.drop_count as usize % self.targets.len()];
                match self.build_airdrop(target).await {
                    Ok(()) => {
                        self.detection = DetectionState::Complete;
                        self.next_phase = MissionPhase::Airdrop;
                    }
                    Err(err) => self.abort_with("airdrop synthesis", &err),
                }
            }
            Ok(_) => {
                self.detect_attempts += 1;
                if self.detect_attempts >= self.max_detect_attempts {
                    error!(
                        "detection failed after {} attempt(s), aborting",
                        self.detect_attempts
                    );
                    self.detection = DetectionState::Fail;
                    self.status = Status::Abort;
                    self.next_phase = MissionPhase::Landing;
                } else {
                    info!("no targets found, repeating detection sweep");
                    self.detection = DetectionState::Incomplete;
                    self.next_phase = MissionPhase::Detect;
                }
            }
        }
    }

    /// Fly the detection sweep and run the detector over its imagery.
    /// Camera or detector trouble counts as an empty sweep; the retry
    /// budget exists exactly for that.
    async fn run_detection(&mut self) -> Result<Vec<Coordinate>> {
        self.flight.wait_and_send_next_mission().await?;
        self.flight
            .wait_for_waypoint_reached(self.plan.detect_index, WAYPOINT_WAIT)
            .await?;

        info!("detection zone reached, capturing imagery");
        let zone = self.detection_zone();
        let images = match self
            .camera
            .capture(self.plan.num_images, CAPTURE_INTERVAL, &self.plan.image_dir)
            .await
        {
            Ok(images) => images,
            Err(err) => {
                warn!("camera failed (code {}): {err}", err.code());
                return Ok(Vec::new());
            }
        };
        match self.detector.detect(&images, &zone).await {
            Ok(targets) => Ok(targets),
            Err(err) => {
                warn!("detector failed (code {}): {err}", err.code());
                Ok(Vec::new())
            }
        }
    }

    pub(crate) async fn airdrop(&mut self) {
        if self.targets.is_empty() || self.drop_count as usize >= self.targets.len() {
            self.abort_with("airdrop", &Error::NoTargets);
            return;
        }
        if let Err(err) = self.flight.wait_and_send_next_mission().await {
            self.abort_with("airdrop", &err);
            return;
        }
        // By default the release fires from the DO_SET_SERVO item inside
        // the mission; this layer only sequences the pass.
        if let Err(err) = self
            .flight
            .wait_for_waypoint_reached(self.plan.airdrop_index, WAYPOINT_WAIT)
            .await
        {
            self.abort_with("airdrop", &err);
            return;
        }
        if self.plan.manual_release {
            if let Err(err) = self.flight.release_payload().await {
                self.abort_with("airdrop release", &err);
                return;
            }
        }
        self.drop_count += 1;
        info!("airdrop pass {} complete", self.drop_count);
        if self.drop_count >= FULL_PAYLOAD_DROPS || self.drop_count as usize >= self.targets.len()
        {
            self.airdrops = AirdropState::Complete;
        }

        // Odd drops chain straight into the next pass; even drops land to
        // reload payload.
        if self.drop_count % 2 == 1 && (self.drop_count as usize) < self.targets.len() {
            let target = self.targets[self.drop_count as usize];
            match self.build_airdrop(target).await {
                Ok(()) => self.next_phase = MissionPhase::Airdrop,
                Err(err) => self.abort_with("airdrop synthesis", &err),
            }
        } else {
            self.next_phase = MissionPhase::Landing;
        }
    }

    pub(crate) async fn land(&mut self) {
        if let Err(err) = self.flight.wait_and_send_next_mission().await {
            self.fail_landing(&err);
            return;
        }
        if let Err(err) = self.flight.wait_for_landed(LANDED_WAIT).await {
            self.fail_landing(&err);
            return;
        }
        self.flight_state = FlightState::Idle;
        if let Err(err) = self.flight.disarm(true).await {
            self.fail_landing(&err);
            return;
        }
        if let Err(err) = self.flight.set_mode("MANUAL").await {
            self.fail_landing(&err);
            return;
        }

        if self.airdrops == AirdropState::Complete || self.status == Status::Abort {
            info!("mission terminated after {} drop(s)", self.drop_count);
            self.next_phase = MissionPhase::Complete;
            return;
        }
        // More payload to deliver: line the plan up for a re-launch.
        if let Err(err) = self.flight.jump_to_next_mission_item().await {
            self.fail_landing(&err);
            return;
        }
        if let Err(err) = self.flight.prepare_payload_reload().await {
            self.fail_landing(&err);
            return;
        }
        info!("landed for reload, waiting for next launch");
        self.next_phase = MissionPhase::TakeoffWait;
    }

    fn fail_landing(&mut self, err: &Error) {
        error!("landing failed (code {}): {err}", err.code());
        self.status = Status::Abort;
        self.next_phase = MissionPhase::Complete;
    }

    async fn build_airdrop(&mut self, target: Coordinate) -> Result<()> {
        self.flight
            .build_airdrop_mission(
                target,
                &self.plan.airdrop,
                self.plan.airdrop_index,
                self.plan.airdrop_altitude,
                self.drop_count,
            )
            .await
    }
}
