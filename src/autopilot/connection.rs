//! Autopilot Link
//!
//! Owns the single full-duplex MAVLink connection. One pump task drains
//! inbound traffic into the telemetry caches and the mission-protocol event
//! channel; everything outbound goes through [`AutopilotLink::send`]. A
//! companion HEARTBEAT is broadcast at 1 Hz.

use crate::autopilot::telemetry::TelemetryCache;
use crate::error::{Error, Result};
use mavlink::ardupilotmega::{
    MavAutopilot, MavMessage, MavMissionResult, MavMissionType, MavModeFlag, MavState, MavType,
    HEARTBEAT_DATA,
};
use mavlink::{AsyncMavConnection, MavHeader};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// System id for this companion computer.
pub const SYSTEM_ID: u8 = 255;
/// MAV_COMP_ID_ONBOARD_COMPUTER.
pub const COMPONENT_ID: u8 = 190;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const MISSION_EVENT_BUFFER: usize = 64;

type Connection = Box<dyn AsyncMavConnection<MavMessage> + Send + Sync>;

/// Mission-protocol traffic surfaced to the upload driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissionEvent {
    Request {
        seq: u16,
        mission_type: MavMissionType,
    },
    Ack {
        result: MavMissionResult,
        mission_type: MavMissionType,
    },
}

pub struct AutopilotLink {
    conn: Arc<Connection>,
    cache: Arc<TelemetryCache>,
    mission_events: Mutex<mpsc::Receiver<MissionEvent>>,
    cancel: CancellationToken,
    header: MavHeader,
}

impl AutopilotLink {
    /// Connect to the autopilot and start the pump and heartbeat tasks.
    pub async fn connect(connection: &str) -> Result<Self> {
        let address = to_mavlink_address(connection);
        info!("connecting to autopilot at {address}");
        let conn: Arc<Connection> = Arc::new(
            mavlink::connect_async::<MavMessage>(&address)
                .await
                .map_err(|err| Error::ConnectionFailed(err.to_string()))?,
        );

        let cache = Arc::new(TelemetryCache::new());
        let (mission_tx, mission_rx) = mpsc::channel(MISSION_EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let header = MavHeader {
            system_id: SYSTEM_ID,
            component_id: COMPONENT_ID,
            sequence: 0,
        };

        tokio::spawn(pump(
            conn.clone(),
            cache.clone(),
            mission_tx,
            cancel.clone(),
        ));
        tokio::spawn(heartbeat(conn.clone(), header, cancel.clone()));

        Ok(Self {
            conn,
            cache,
            mission_events: Mutex::new(mission_rx),
            cancel,
            header,
        })
    }

    pub fn cache(&self) -> &TelemetryCache {
        &self.cache
    }

    /// Token observed by every blocking wait; cancelling it makes waits
    /// return [`Error::Cancelled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver of mission-protocol traffic. The upload driver holds the
    /// lock for the duration of one transfer.
    pub fn mission_events(&self) -> &Mutex<mpsc::Receiver<MissionEvent>> {
        &self.mission_events
    }

    pub async fn send(&self, msg: MavMessage) -> Result<()> {
        self.conn
            .send(&self.header, &msg)
            .await
            .map(|_| ())
            .map_err(|_| Error::LinkClosed)
    }

    /// Stop the pump and heartbeat tasks and cancel outstanding waits.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn pump(
    conn: Arc<Connection>,
    cache: Arc<TelemetryCache>,
    mission_tx: mpsc::Sender<MissionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = conn.recv() => received,
        };
        match received {
            Ok((header, msg)) => {
                cache.ingest(&header, &msg);
                let event = match &msg {
                    MavMessage::MISSION_REQUEST(req) => Some(MissionEvent::Request {
                        seq: req.seq,
                        mission_type: req.mission_type,
                    }),
                    MavMessage::MISSION_REQUEST_INT(req) => Some(MissionEvent::Request {
                        seq: req.seq,
                        mission_type: req.mission_type,
                    }),
                    MavMessage::MISSION_ACK(ack) => Some(MissionEvent::Ack {
                        result: ack.mavtype,
                        mission_type: ack.mission_type,
                    }),
                    _ => None,
                };
                if let Some(event) = event {
                    // Dropped events only matter mid-upload, and the driver
                    // drains the channel before it starts.
                    let _ = mission_tx.try_send(event);
                }
            }
            Err(mavlink::error::MessageReadError::Io(err)) => {
                error!("autopilot link read failed: {err}");
                break;
            }
            Err(err) => {
                debug!("unparseable frame: {err}");
            }
        }
    }
    debug!("telemetry pump stopped");
}

async fn heartbeat(conn: Arc<Connection>, header: MavHeader, cancel: CancellationToken) {
    let beat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    });
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if conn.send(&header, &beat).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Map the CLI connection string onto a mavlink address. Bare device paths
/// become serial at 57600 baud; `scheme://host:port` becomes the matching
/// mavlink transport; already-prefixed addresses pass through.
pub fn to_mavlink_address(connection: &str) -> String {
    if let Some(rest) = connection.strip_prefix("tcp://") {
        return format!("tcpout:{rest}");
    }
    if let Some(rest) = connection.strip_prefix("udp://") {
        return format!("udpin:{rest}");
    }
    for prefix in ["serial:", "tcpout:", "tcpin:", "udpout:", "udpin:"] {
        if connection.starts_with(prefix) {
            return connection.to_string();
        }
    }
    match connection.rsplit_once(':') {
        Some((device, baud)) if baud.chars().all(|c| c.is_ascii_digit()) => {
            format!("serial:{device}:{baud}")
        }
        _ => format!("serial:{connection}:57600"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_mapping() {
        assert_eq!(
            to_mavlink_address("/dev/ttyACM0"),
            "serial:/dev/ttyACM0:57600"
        );
        assert_eq!(
            to_mavlink_address("/dev/ttyACM0:115200"),
            "serial:/dev/ttyACM0:115200"
        );
        assert_eq!(
            to_mavlink_address("tcp://127.0.0.1:5762"),
            "tcpout:127.0.0.1:5762"
        );
        assert_eq!(
            to_mavlink_address("udp://0.0.0.0:14550"),
            "udpin:0.0.0.0:14550"
        );
        assert_eq!(
            to_mavlink_address("udpin:0.0.0.0:14550"),
            "udpin:0.0.0.0:14550"
        );
    }
}
