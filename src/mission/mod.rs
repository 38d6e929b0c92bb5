//! Missions
//!
//! An ordered sequence of mission items sharing a mission-type tag, loaded
//! from the text format or built programmatically, validated, and uploaded
//! to the autopilot over the request/response protocol.

pub mod file;
pub mod item;
pub mod upload;

use crate::autopilot::connection::{AutopilotLink, MissionEvent};
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use mavlink::ardupilotmega::{MavMessage, MavMissionType, MISSION_COUNT_DATA};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use item::{Frame, MissionCommand, MissionItem};
pub use upload::UploadMachine;

/// How long the upload driver waits on the event channel per tick.
const UPLOAD_TICK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Mission {
    items: Vec<MissionItem>,
    mission_type: MavMissionType,
    target_system: u8,
    target_component: u8,
}

impl Mission {
    pub fn new(mission_type: MavMissionType, target_system: u8, target_component: u8) -> Self {
        Self {
            items: Vec::new(),
            mission_type,
            target_system,
            target_component,
        }
    }

    /// Load a mission from a `QGC WPL 110` file.
    pub fn load(
        path: &Path,
        mission_type: MavMissionType,
        target_system: u8,
        target_component: u8,
    ) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        if text.trim().is_empty() {
            return Err(Error::FileEmpty(path.to_path_buf()));
        }
        let items = file::parse(&text)?;
        debug!(
            "loaded {} item(s) from {}",
            items.len(),
            path.display()
        );
        Ok(Self {
            items,
            mission_type,
            target_system,
            target_component,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MissionItem] {
        &self.items
    }

    /// Push an item at the end, assigning the next sequence number.
    pub fn push(&mut self, mut item: MissionItem) {
        item.seq = self.items.len() as u16;
        self.items.push(item);
    }

    /// Insert an item after `index`, then re-sequence.
    pub fn insert_after(&mut self, index: usize, item: MissionItem) {
        self.items.insert(index + 1, item);
        self.resequence();
    }

    /// Extend with another mission's items; sequence numbers stay dense and
    /// zero-based. The autopilot's plan is immutable between uploads, so the
    /// combined mission must be re-uploaded in full afterwards.
    pub fn append(&mut self, other: &Mission) {
        self.items.extend(other.items.iter().cloned());
        self.resequence();
    }

    pub fn resequence(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.seq = index as u16;
        }
    }

    /// Replace the coordinate of the navigation item at sequence `seq`.
    pub fn set_item_coordinate(&mut self, seq: u16, coord: &Coordinate) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.seq == seq)
            .ok_or(Error::BadSequence(seq))?;
        item.set_coordinate(coord);
        Ok(())
    }

    /// The polygon described by a fence mission's inclusion vertices.
    pub fn fence_polygon(&self) -> Vec<Coordinate> {
        self.items
            .iter()
            .filter(|item| item.command == MissionCommand::FencePolygonVertexInclusion)
            .filter_map(|item| item.coordinate().ok())
            .collect()
    }

    /// Pre-upload validation: dense zero-based sequence, and when a fence is
    /// supplied, every positioned navigation item inside its polygon.
    pub fn validate(&self, fence: Option<&Mission>) -> Result<()> {
        for (index, item) in self.items.iter().enumerate() {
            if item.seq != index as u16 {
                return Err(Error::MalformedItem { line: index + 2 });
            }
        }
        if let Some(fence) = fence {
            let polygon = fence.fence_polygon();
            if polygon.len() >= 3 {
                for item in &self.items {
                    if !item.command.is_nav() || (item.lat == 0.0 && item.lon == 0.0) {
                        continue;
                    }
                    let coord = item.coordinate()?;
                    if !coord.within_polygon(&polygon) {
                        return Err(Error::FenceViolation { seq: item.seq });
                    }
                }
            }
        }
        Ok(())
    }

    /// Upload over the request/response protocol. Items are sent strictly
    /// in response to requests for their sequence number; `current` is
    /// forced to 1 on item 0 and 0 elsewhere.
    pub async fn upload(&self, link: &AutopilotLink) -> Result<()> {
        let mut events = link.mission_events().lock().await;
        while events.try_recv().is_ok() {} // stale protocol traffic

        let count = self.items.len() as u16;
        let mut machine = UploadMachine::new(count, Instant::now());

        link.send(MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            count,
            mission_type: self.mission_type,
            opaque_id: 0,
        }))
        .await?;

        loop {
            if machine.expired(Instant::now()) {
                return Err(Error::UploadTimeout);
            }
            let event = match tokio::time::timeout(UPLOAD_TICK, events.recv()).await {
                Err(_) => continue, // a quiet tick is not an error
                Ok(None) => return Err(Error::LinkClosed),
                Ok(Some(event)) => event,
            };
            match event {
                MissionEvent::Request { seq, mission_type }
                    if mission_type == self.mission_type =>
                {
                    let answer = machine.on_request(seq, Instant::now())?;
                    let item = &self.items[answer as usize];
                    let current = u8::from(answer == 0);
                    link.send(MavMessage::MISSION_ITEM_INT(item.to_wire(
                        current,
                        self.mission_type,
                        self.target_system,
                        self.target_component,
                    )))
                    .await?;
                }
                MissionEvent::Ack {
                    result,
                    mission_type,
                } if mission_type == self.mission_type => {
                    machine.on_ack(result)?;
                    info!(
                        "uploaded {}/{} item(s) ({:?})",
                        machine.sent_count(),
                        count,
                        self.mission_type
                    );
                    return Ok(());
                }
                // Traffic for another mission type belongs to nobody else;
                // the connection is single-owner. Ignore it.
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::item::MissionCommand;

    fn waypoint(seq: u16, lat: f64, lon: f64) -> MissionItem {
        let coord = Coordinate::new(lat, lon, 40.0).unwrap();
        MissionItem::nav(seq, MissionCommand::Waypoint, &coord)
    }

    fn fence_mission() -> Mission {
        let mut fence = Mission::new(MavMissionType::MAV_MISSION_TYPE_FENCE, 1, 1);
        for (lat, lon) in [
            (38.31, -76.56),
            (38.32, -76.56),
            (38.32, -76.54),
            (38.31, -76.54),
        ] {
            let coord = Coordinate::new(lat, lon, 0.0).unwrap();
            let mut item = MissionItem::nav(
                0,
                MissionCommand::FencePolygonVertexInclusion,
                &coord,
            );
            item.param1 = 4.0; // vertex count
            fence.push(item);
        }
        fence
    }

    #[test]
    fn append_resequences_contiguously() {
        let mut first = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        first.push(waypoint(0, 38.315, -76.55));
        first.push(waypoint(0, 38.316, -76.55));

        let mut second = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        second.push(waypoint(0, 38.317, -76.55));

        first.append(&second);
        let seqs: Vec<u16> = first.items().iter().map(|item| item.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn validate_accepts_in_fence_waypoints() {
        let mut mission = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        mission.push(waypoint(0, 38.315, -76.55));
        mission.push(waypoint(0, 38.316, -76.55));
        assert!(mission.validate(Some(&fence_mission())).is_ok());
    }

    #[test]
    fn validate_flags_out_of_fence_waypoint() {
        let mut mission = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        mission.push(waypoint(0, 38.315, -76.55));
        mission.push(waypoint(0, 38.35, -76.55));
        assert!(matches!(
            mission.validate(Some(&fence_mission())),
            Err(Error::FenceViolation { seq: 1 })
        ));
    }

    #[test]
    fn validate_requires_dense_sequence() {
        let mut mission = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        mission.push(waypoint(0, 38.315, -76.55));
        mission.items[0].seq = 4;
        assert!(matches!(
            mission.validate(None),
            Err(Error::MalformedItem { .. })
        ));
    }

    #[test]
    fn insert_after_keeps_order() {
        let mut mission = Mission::new(MavMissionType::MAV_MISSION_TYPE_MISSION, 1, 1);
        mission.push(waypoint(0, 38.315, -76.55));
        mission.push(waypoint(0, 38.316, -76.55));
        mission.insert_after(0, MissionItem::set_servo(0, 9, 1900));

        assert_eq!(mission.items()[1].command, MissionCommand::DoSetServo);
        let seqs: Vec<u16> = mission.items().iter().map(|item| item.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
