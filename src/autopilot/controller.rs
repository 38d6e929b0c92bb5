//! Autopilot Command Operations
//!
//! COMMAND_LONG construction and the ACK discipline shared by every
//! command: send, watch the ACK cache, retry up to three times on a 2 s
//! timeout, and map rejections to the caller's error kind.

use crate::autopilot::connection::AutopilotLink;
use crate::autopilot::modes;
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use mavlink::ardupilotmega::{
    MavCmd, MavMessage, MavResult, COMMAND_LONG_DATA, MISSION_SET_CURRENT_DATA,
    PARAM_REQUEST_READ_DATA,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);
pub const COMMAND_RETRIES: u32 = 3;
const ACK_POLL: Duration = Duration::from_millis(50);

/// ArduPilot magic number that forces arm/disarm past the safety checks.
const FORCE_MAGIC: f32 = 21196.0;

pub struct AutopilotController {
    link: Arc<AutopilotLink>,
    target_system: u8,
    target_component: u8,
}

impl AutopilotController {
    pub fn new(link: Arc<AutopilotLink>) -> Self {
        Self {
            link,
            target_system: 1,
            target_component: 1,
        }
    }

    pub fn link(&self) -> &Arc<AutopilotLink> {
        &self.link
    }

    pub fn target(&self) -> (u8, u8) {
        (self.target_system, self.target_component)
    }

    /// Block until the first autopilot HEARTBEAT; subsequent commands
    /// target that system.
    pub async fn wait_heartbeat(&mut self, timeout: Duration) -> Result<u8> {
        let mut rx = self.link.cache().origin_rx();
        let cancel = self.link.cancel_token();
        let wait = async {
            loop {
                if let Some((system, component)) = *rx.borrow() {
                    return Ok((system, component));
                }
                if rx.changed().await.is_err() {
                    return Err(Error::LinkClosed);
                }
            }
        };
        let (system, component) = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, wait) => {
                result.map_err(|_| Error::HeartbeatTimeout)??
            }
        };
        self.target_system = system;
        self.target_component = component;
        info!("autopilot is system {system}, component {component}");
        Ok(system)
    }

    /// Set a flight mode by name through the ArduPlane mode table.
    pub async fn set_mode(&self, name: &str) -> Result<()> {
        let mode = modes::mode_number(name).ok_or_else(|| Error::UnknownMode(name.to_string()))?;
        info!("setting mode {name}");
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [1.0, mode as f32, 0.0, 0.0, 0.0, 0.0, 0.0], // param1 = custom-mode flag
            Error::ModeRejected,
        )
        .await
    }

    pub async fn arm(&self, force: bool) -> Result<()> {
        info!(force, "arming");
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, if force { FORCE_MAGIC } else { 0.0 }, 0.0, 0.0, 0.0, 0.0, 0.0],
            Error::ArmRejected,
        )
        .await
    }

    pub async fn disarm(&self, force: bool) -> Result<()> {
        info!(force, "disarming");
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [0.0, if force { FORCE_MAGIC } else { 0.0 }, 0.0, 0.0, 0.0, 0.0, 0.0],
            Error::ArmRejected,
        )
        .await
    }

    pub async fn set_servo(&self, index: u8, pwm: u16) -> Result<()> {
        info!("servo {index} -> {pwm} us");
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_SERVO,
            [index as f32, pwm as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
            Error::ServoRejected,
        )
        .await
    }

    pub async fn set_home(&self, coord: &Coordinate) -> Result<()> {
        info!("setting home {coord}");
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_HOME,
            [
                0.0, // use the specified location
                0.0,
                0.0,
                0.0,
                coord.lat() as f32,
                coord.lon() as f32,
                coord.alt(),
            ],
            Error::CommandRejected,
        )
        .await
    }

    pub async fn run_prearm_checks(&self) -> Result<()> {
        info!("running prearm checks");
        self.command_long(
            MavCmd::MAV_CMD_RUN_PREARM_CHECKS,
            [0.0; 7],
            Error::CommandRejected,
        )
        .await
    }

    /// Skip the autopilot ahead to mission item `seq`. MISSION_SET_CURRENT
    /// has no COMMAND_ACK; confirmation is the MISSION_CURRENT cache
    /// catching up.
    pub async fn set_current_mission_item(&self, seq: u16) -> Result<()> {
        let (target_system, target_component) = self.target();
        let cancel = self.link.cancel_token();
        for attempt in 1..=COMMAND_RETRIES {
            self.link
                .send(MavMessage::MISSION_SET_CURRENT(MISSION_SET_CURRENT_DATA {
                    target_system,
                    target_component,
                    seq,
                }))
                .await?;
            let deadline = Instant::now() + ACK_TIMEOUT;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if self.link.cache().mission_current() == Some(seq) {
                    return Ok(());
                }
                tokio::time::sleep(ACK_POLL).await;
            }
            warn!("MISSION_SET_CURRENT({seq}) unconfirmed, attempt {attempt}");
        }
        Err(Error::AckTimeout)
    }

    /// Read one parameter by name.
    pub async fn get_param(&self, name: &str) -> Result<f32> {
        let (target_system, target_component) = self.target();
        let mut param_id = [0u8; 16];
        for (slot, byte) in param_id.iter_mut().zip(name.bytes()) {
            *slot = byte;
        }
        let cancel = self.link.cancel_token();
        for _ in 0..COMMAND_RETRIES {
            let sent_at = Instant::now();
            self.link
                .send(MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
                    param_index: -1,
                    target_system,
                    target_component,
                    param_id,
                }))
                .await?;
            let deadline = sent_at + ACK_TIMEOUT;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if let Some(value) = self.link.cache().param_since(sent_at, name) {
                    return Ok(value);
                }
                tokio::time::sleep(ACK_POLL).await;
            }
        }
        Err(Error::AckTimeout)
    }

    /// Send a COMMAND_LONG and wait for its COMMAND_ACK, retrying the full
    /// send on timeout. Rejections map through `reject`.
    pub async fn command_long(
        &self,
        command: MavCmd,
        params: [f32; 7],
        reject: fn(String) -> Error,
    ) -> Result<()> {
        let (target_system, target_component) = self.target();
        let cancel = self.link.cancel_token();
        for attempt in 1..=COMMAND_RETRIES {
            let sent_at = Instant::now();
            self.link
                .send(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
                    target_system,
                    target_component,
                    command,
                    confirmation: 0,
                    param1: params[0],
                    param2: params[1],
                    param3: params[2],
                    param4: params[3],
                    param5: params[4],
                    param6: params[5],
                    param7: params[6],
                }))
                .await?;

            let deadline = sent_at + ACK_TIMEOUT;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if let Some(ack) = self.link.cache().ack_since(sent_at) {
                    if ack.command != command {
                        tokio::time::sleep(ACK_POLL).await;
                        continue;
                    }
                    match ack.result {
                        MavResult::MAV_RESULT_ACCEPTED => return Ok(()),
                        MavResult::MAV_RESULT_IN_PROGRESS => {}
                        MavResult::MAV_RESULT_TEMPORARILY_REJECTED => break,
                        result => return Err(reject(format!("{result:?}"))),
                    }
                }
                tokio::time::sleep(ACK_POLL).await;
            }
            warn!("{command:?} unacknowledged, attempt {attempt}");
        }
        Err(Error::AckTimeout)
    }
}
