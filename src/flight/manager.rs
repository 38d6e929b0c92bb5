//! Flight Manager
//!
//! The concrete [`FlightOps`] implementation: owns the controller, the
//! loaded fence and landing missions, the queue of plans waiting to be
//! sent, and the synthesized airdrop mission.

use crate::autopilot::AutopilotController;
use crate::error::{Error, Result};
use crate::flight::FlightOps;
use crate::geo::Coordinate;
use crate::mission::{Mission, MissionItem};
use crate::plan::MissionPlan;
use crate::release::AirdropTrigger;
use async_trait::async_trait;
use mavlink::ardupilotmega::MavMissionType;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long preflight waits for the first autopilot heartbeat.
const HEARTBEAT_WAIT: Duration = Duration::from_secs(30);
/// How long takeoff waits for MISSION_CURRENT to advance past item 0.
const TAKEOFF_CONFIRM: Duration = Duration::from_secs(60);
/// Upper bound on riding out the active plan before the next is sent.
const MISSION_END_WAIT: Duration = Duration::from_secs(600);

/// 4 Hz poll for waypoint and landing waits.
const WAIT_POLL: Duration = Duration::from_millis(250);
const CHANNEL_POLL: Duration = Duration::from_millis(50);
/// The RC trigger must hold in tolerance this long to count.
const CHANNEL_DWELL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct FlightConfig {
    pub airdrop_servo: u8,
    pub servo_open_pwm: u16,
    pub servo_close_pwm: u16,
}

impl FlightConfig {
    pub fn from_plan(plan: &MissionPlan) -> Self {
        Self {
            airdrop_servo: plan.airdrop_servo,
            servo_open_pwm: plan.servo_open_pwm,
            servo_close_pwm: plan.servo_close_pwm,
        }
    }
}

pub struct FlightManager {
    controller: AutopilotController,
    trigger: AirdropTrigger,
    fence: Option<Mission>,
    landing: Option<Mission>,
    /// Plan the autopilot is currently flying.
    active: Option<Mission>,
    /// Plans queued behind the active one.
    pending: VecDeque<Mission>,
    /// Synthesized airdrop mission awaiting queueing.
    airdrop: Option<Mission>,
}

impl FlightManager {
    pub fn new(controller: AutopilotController, config: FlightConfig) -> Self {
        let trigger = AirdropTrigger::new(
            config.airdrop_servo,
            config.servo_open_pwm,
            config.servo_close_pwm,
        );
        Self {
            controller,
            trigger,
            fence: None,
            landing: None,
            active: None,
            pending: VecDeque::new(),
            airdrop: None,
        }
    }

    fn load_validated(&self, path: &Path, mission_type: MavMissionType) -> Result<Mission> {
        let (system, component) = self.controller.target();
        let mission = Mission::load(path, mission_type, system, component)?;
        mission.validate(self.fence.as_ref())?;
        Ok(mission)
    }
}

#[async_trait]
impl FlightOps for FlightManager {
    async fn preflight_check(
        &mut self,
        landing: &Path,
        fence: &Path,
        home: Coordinate,
    ) -> Result<()> {
        self.controller.wait_heartbeat(HEARTBEAT_WAIT).await?;

        let fence_mission = self.load_validated(fence, MavMissionType::MAV_MISSION_TYPE_FENCE)?;
        let landing_mission = {
            let (system, component) = self.controller.target();
            let mission =
                Mission::load(landing, MavMissionType::MAV_MISSION_TYPE_MISSION, system, component)?;
            mission.validate(Some(&fence_mission))?;
            mission
        };

        fence_mission.upload(self.controller.link()).await?;
        self.fence = Some(fence_mission);
        // Landing is held back until it is queued behind the flight plan.
        self.landing = Some(landing_mission);

        self.controller.set_home(&home).await?;
        self.controller.run_prearm_checks().await?;

        match self.controller.get_param("FENCE_ENABLE").await {
            Ok(value) if value < 1.0 => {
                warn!("FENCE_ENABLE is {value}, the uploaded fence may be inactive")
            }
            Ok(_) => {}
            Err(err) => warn!("could not read FENCE_ENABLE: {err}"),
        }

        info!("preflight check passed");
        Ok(())
    }

    async fn validate_mission(&mut self, path: &Path) -> Result<()> {
        self.load_validated(path, MavMissionType::MAV_MISSION_TYPE_MISSION)
            .map(|_| ())
    }

    async fn takeoff(&mut self, path: &Path) -> Result<()> {
        let mission = self.load_validated(path, MavMissionType::MAV_MISSION_TYPE_MISSION)?;
        mission.upload(self.controller.link()).await?;
        self.active = Some(mission);

        self.controller.arm(true).await?;
        self.controller.set_mode("AUTO").await?;
        // MISSION_CURRENT moving past item 0 means the plan is executing.
        self.wait_for_waypoint_reached(1, TAKEOFF_CONFIRM).await?;
        info!("takeoff underway");
        Ok(())
    }

    async fn wait_for_waypoint_reached(&mut self, seq: u16, timeout: Duration) -> Result<()> {
        let cancel = self.controller.link().cancel_token();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(current) = self.controller.link().cache().mission_current() {
                if current >= seq {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::WaypointTimeout(seq));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(WAIT_POLL) => {}
            }
        }
    }

    async fn wait_for_landed(&mut self, timeout: Duration) -> Result<()> {
        let cancel = self.controller.link().cancel_token();
        let deadline = Instant::now() + timeout;
        loop {
            let cache = self.controller.link().cache();
            let on_ground = cache.landed_state() == Some(crate::autopilot::LandedState::OnGround);
            let disarmed = cache.armed() == Some(false);
            if on_ground && disarmed {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::LandedTimeout);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(WAIT_POLL) => {}
            }
        }
    }

    async fn wait_for_channel_input(
        &mut self,
        channel: u8,
        value: u16,
        timeout: Duration,
        tolerance: u16,
    ) -> Result<()> {
        let cancel = self.controller.link().cancel_token();
        let deadline = Instant::now() + timeout;
        // The dwell requirement suppresses spurious spikes.
        let mut held_since: Option<Instant> = None;
        loop {
            let in_tolerance = self
                .controller
                .link()
                .cache()
                .rc_channel(channel)
                .is_some_and(|pwm| pwm.abs_diff(value) <= tolerance);
            if in_tolerance {
                let start = *held_since.get_or_insert_with(Instant::now);
                if start.elapsed() >= CHANNEL_DWELL {
                    return Ok(());
                }
            } else {
                held_since = None;
            }
            if Instant::now() >= deadline {
                return Err(Error::ChannelTimeout(channel));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(CHANNEL_POLL) => {}
            }
        }
    }

    async fn append_mission(&mut self, path: &Path) -> Result<()> {
        let mission = self.load_validated(path, MavMissionType::MAV_MISSION_TYPE_MISSION)?;
        info!("queued {} ({} items)", path.display(), mission.len());
        self.pending.push_back(mission);
        Ok(())
    }

    async fn append_airdrop_mission(&mut self) -> Result<()> {
        let mission = self.airdrop.clone().ok_or(Error::NoTargets)?;
        info!("queued airdrop mission ({} items)", mission.len());
        self.pending.push_back(mission);
        Ok(())
    }

    async fn append_landing_mission(&mut self) -> Result<()> {
        let mission = self
            .landing
            .clone()
            .ok_or(Error::InvalidPhase("landing mission not loaded"))?;
        info!("queued landing mission ({} items)", mission.len());
        self.pending.push_back(mission);
        Ok(())
    }

    async fn build_airdrop_mission(
        &mut self,
        target: Coordinate,
        template: &Path,
        target_index: u16,
        altitude: f32,
        drop_count: u32,
    ) -> Result<()> {
        let mut mission =
            self.load_validated(template, MavMissionType::MAV_MISSION_TYPE_MISSION)?;
        let release_point = target.with_altitude(altitude)?;
        mission.set_item_coordinate(target_index, &release_point)?;

        let position = mission
            .items()
            .iter()
            .position(|item| item.seq == target_index)
            .ok_or(Error::BadSequence(target_index))?;
        mission.insert_after(
            position,
            MissionItem::set_servo(0, self.trigger.servo, self.trigger.open_pwm),
        );
        mission.validate(self.fence.as_ref())?;

        info!(
            "airdrop mission built for drop {} at {}",
            drop_count, release_point
        );
        self.airdrop = Some(mission);
        Ok(())
    }

    async fn wait_and_send_next_mission(&mut self) -> Result<()> {
        let last = match &self.active {
            Some(active) if !active.is_empty() => (active.len() - 1) as u16,
            _ => return Err(Error::NoPendingMission),
        };
        self.wait_for_waypoint_reached(last, MISSION_END_WAIT).await?;

        let next = self.pending.pop_front().ok_or(Error::NoPendingMission)?;
        next.upload(self.controller.link()).await?;
        self.controller.set_current_mission_item(0).await?;
        self.active = Some(next);
        Ok(())
    }

    async fn jump_to_next_mission_item(&mut self) -> Result<()> {
        let current = self
            .controller
            .link()
            .cache()
            .mission_current()
            .unwrap_or(0);
        self.controller.set_current_mission_item(current + 1).await
    }

    async fn release_payload(&mut self) -> Result<()> {
        info!("firing payload release");
        self.trigger.release(&self.controller).await
    }

    async fn prepare_payload_reload(&mut self) -> Result<()> {
        warn!("re-closing payload bay for reload");
        self.trigger.reset(&self.controller).await
    }

    async fn disarm(&mut self, force: bool) -> Result<()> {
        self.controller.disarm(force).await
    }

    async fn set_mode(&mut self, name: &str) -> Result<()> {
        self.controller.set_mode(name).await
    }
}
