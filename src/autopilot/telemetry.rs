//! Telemetry Last-Value Caches
//!
//! The pump task feeds every inbound message through [`TelemetryCache::ingest`];
//! blocking waits elsewhere poll the cached values. Each value carries its
//! receipt time, and anything older than [`TELEMETRY_STALE`] reads back as
//! "no data" so a dead link cannot satisfy a wait.

use mavlink::ardupilotmega::{MavAutopilot, MavCmd, MavLandedState, MavMessage, MavModeFlag, MavResult};
use mavlink::MavHeader;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Age beyond which a cached value no longer counts.
pub const TELEMETRY_STALE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct Stamped<T> {
    pub value: T,
    pub at: Instant,
}

impl<T> Stamped<T> {
    fn now(value: T) -> Self {
        Self {
            value,
            at: Instant::now(),
        }
    }
}

/// Mode and arming state from the autopilot HEARTBEAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatStatus {
    pub custom_mode: u32,
    pub armed: bool,
}

/// Raw PWM values for RC channels 1..=18.
#[derive(Debug, Clone, Copy)]
pub struct RcChannels {
    raw: [u16; 18],
}

impl RcChannels {
    /// PWM for a 1-based channel number.
    pub fn channel(&self, channel: u8) -> Option<u16> {
        match channel {
            1..=18 => Some(self.raw[channel as usize - 1]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandedState {
    Unknown,
    OnGround,
    InAir,
    TakingOff,
    Landing,
}

impl LandedState {
    fn from_mav(state: MavLandedState) -> Self {
        match state {
            MavLandedState::MAV_LANDED_STATE_ON_GROUND => LandedState::OnGround,
            MavLandedState::MAV_LANDED_STATE_IN_AIR => LandedState::InAir,
            MavLandedState::MAV_LANDED_STATE_TAKEOFF => LandedState::TakingOff,
            MavLandedState::MAV_LANDED_STATE_LANDING => LandedState::Landing,
            _ => LandedState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandAck {
    pub command: MavCmd,
    pub result: MavResult,
}

#[derive(Debug, Clone)]
pub struct ParamValue {
    pub id: String,
    pub value: f32,
}

pub struct TelemetryCache {
    mission_current: watch::Sender<Option<Stamped<u16>>>,
    heartbeat: watch::Sender<Option<Stamped<HeartbeatStatus>>>,
    rc_channels: watch::Sender<Option<Stamped<RcChannels>>>,
    landed: watch::Sender<Option<Stamped<LandedState>>>,
    ack: watch::Sender<Option<Stamped<CommandAck>>>,
    param: watch::Sender<Option<Stamped<ParamValue>>>,
    /// System/component id of the first autopilot heartbeat seen.
    origin: watch::Sender<Option<(u8, u8)>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self {
            mission_current: watch::channel(None).0,
            heartbeat: watch::channel(None).0,
            rc_channels: watch::channel(None).0,
            landed: watch::channel(None).0,
            ack: watch::channel(None).0,
            param: watch::channel(None).0,
            origin: watch::channel(None).0,
        }
    }

    /// Dispatch one inbound message into the caches.
    pub fn ingest(&self, header: &MavHeader, msg: &MavMessage) {
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                // GCS and companion heartbeats advertise an invalid
                // autopilot type; only the flight controller locks origin.
                if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_INVALID {
                    return;
                }
                if self.origin.borrow().is_none() {
                    info!(
                        "autopilot heartbeat from system {} component {}",
                        header.system_id, header.component_id
                    );
                    self.origin
                        .send_replace(Some((header.system_id, header.component_id)));
                }
                let previous_mode = self
                    .heartbeat
                    .borrow()
                    .as_ref()
                    .map(|stamped| stamped.value.custom_mode);
                if previous_mode != Some(hb.custom_mode) {
                    info!(
                        "flight mode {}",
                        crate::autopilot::modes::mode_name(hb.custom_mode)
                    );
                }
                self.heartbeat.send_replace(Some(Stamped::now(HeartbeatStatus {
                    custom_mode: hb.custom_mode,
                    armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                })));
            }
            MavMessage::MISSION_CURRENT(mc) => {
                self.mission_current.send_replace(Some(Stamped::now(mc.seq)));
            }
            MavMessage::RC_CHANNELS(rc) => {
                let raw = [
                    rc.chan1_raw, rc.chan2_raw, rc.chan3_raw, rc.chan4_raw, rc.chan5_raw,
                    rc.chan6_raw, rc.chan7_raw, rc.chan8_raw, rc.chan9_raw, rc.chan10_raw,
                    rc.chan11_raw, rc.chan12_raw, rc.chan13_raw, rc.chan14_raw, rc.chan15_raw,
                    rc.chan16_raw, rc.chan17_raw, rc.chan18_raw,
                ];
                self.rc_channels
                    .send_replace(Some(Stamped::now(RcChannels { raw })));
            }
            MavMessage::EXTENDED_SYS_STATE(state) => {
                self.landed
                    .send_replace(Some(Stamped::now(LandedState::from_mav(state.landed_state))));
            }
            MavMessage::COMMAND_ACK(ack) => {
                self.ack.send_replace(Some(Stamped::now(CommandAck {
                    command: ack.command,
                    result: ack.result,
                })));
            }
            MavMessage::PARAM_VALUE(param) => {
                let id = String::from_utf8_lossy(&param.param_id)
                    .trim_end_matches('\0')
                    .to_string();
                self.param.send_replace(Some(Stamped::now(ParamValue {
                    id,
                    value: param.param_value,
                })));
            }
            MavMessage::STATUSTEXT(text) => {
                let message = String::from_utf8_lossy(&text.text)
                    .trim_end_matches('\0')
                    .to_string();
                match text.severity as u8 {
                    0..=3 => error!("autopilot: {message}"),
                    4 => warn!("autopilot: {message}"),
                    5 | 6 => info!("autopilot: {message}"),
                    _ => debug!("autopilot: {message}"),
                }
            }
            _ => {}
        }
    }

    pub fn origin(&self) -> Option<(u8, u8)> {
        *self.origin.borrow()
    }

    pub fn origin_rx(&self) -> watch::Receiver<Option<(u8, u8)>> {
        self.origin.subscribe()
    }

    /// Current mission sequence, fresh values only.
    pub fn mission_current(&self) -> Option<u16> {
        fresh(&self.mission_current)
    }

    pub fn heartbeat(&self) -> Option<HeartbeatStatus> {
        fresh(&self.heartbeat)
    }

    pub fn armed(&self) -> Option<bool> {
        self.heartbeat().map(|hb| hb.armed)
    }

    /// Fresh PWM reading for a 1-based RC channel.
    pub fn rc_channel(&self, channel: u8) -> Option<u16> {
        fresh(&self.rc_channels).and_then(|rc| rc.channel(channel))
    }

    pub fn landed_state(&self) -> Option<LandedState> {
        fresh(&self.landed)
    }

    /// Last COMMAND_ACK received at or after `since`.
    pub fn ack_since(&self, since: Instant) -> Option<CommandAck> {
        self.ack
            .borrow()
            .as_ref()
            .filter(|stamped| stamped.at >= since)
            .map(|stamped| stamped.value)
    }

    /// Last PARAM_VALUE for `id` received at or after `since`.
    pub fn param_since(&self, since: Instant, id: &str) -> Option<f32> {
        self.param
            .borrow()
            .as_ref()
            .filter(|stamped| stamped.at >= since && stamped.value.id == id)
            .map(|stamped| stamped.value.value)
    }
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh<T: Clone>(slot: &watch::Sender<Option<Stamped<T>>>) -> Option<T> {
    slot.borrow()
        .as_ref()
        .filter(|stamped| stamped.at.elapsed() <= TELEMETRY_STALE)
        .map(|stamped| stamped.value.clone())
}
