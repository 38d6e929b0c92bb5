//! Flight Operations
//!
//! High-level flight operations built on the mission and autopilot layers.
//! The [`FlightOps`] trait is the seam the state-machine actions call
//! through, so the action layer can run against a scripted flight in tests.

pub mod manager;

use crate::error::Result;
use crate::geo::Coordinate;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use manager::{FlightConfig, FlightManager};

#[async_trait]
pub trait FlightOps: Send {
    /// Heartbeat, landing/fence validation, fence upload, home, prearm.
    async fn preflight_check(
        &mut self,
        landing: &Path,
        fence: &Path,
        home: Coordinate,
    ) -> Result<()>;

    /// Load and validate a mission file without keeping it.
    async fn validate_mission(&mut self, path: &Path) -> Result<()>;

    /// Upload the takeoff mission, arm, enter AUTO, and confirm the
    /// autopilot has started executing.
    async fn takeoff(&mut self, path: &Path) -> Result<()>;

    async fn wait_for_waypoint_reached(&mut self, seq: u16, timeout: Duration) -> Result<()>;

    async fn wait_for_landed(&mut self, timeout: Duration) -> Result<()>;

    async fn wait_for_channel_input(
        &mut self,
        channel: u8,
        value: u16,
        timeout: Duration,
        tolerance: u16,
    ) -> Result<()>;

    /// Queue a mission file as the next plan to send.
    async fn append_mission(&mut self, path: &Path) -> Result<()>;

    /// Queue the synthesized airdrop mission.
    async fn append_airdrop_mission(&mut self) -> Result<()>;

    /// Queue the landing mission stored during preflight.
    async fn append_landing_mission(&mut self) -> Result<()>;

    /// Synthesize the airdrop mission for `target` from the template file.
    async fn build_airdrop_mission(
        &mut self,
        target: Coordinate,
        template: &Path,
        target_index: u16,
        altitude: f32,
        drop_count: u32,
    ) -> Result<()>;

    /// Block until the active plan is on its final item, then upload the
    /// next queued plan and restart from its first item.
    async fn wait_and_send_next_mission(&mut self) -> Result<()>;

    async fn jump_to_next_mission_item(&mut self) -> Result<()>;

    /// Fire the release servo directly: open, dwell, close.
    async fn release_payload(&mut self) -> Result<()>;

    /// Drive the payload bay back to the loaded position between drops.
    async fn prepare_payload_reload(&mut self) -> Result<()>;

    async fn disarm(&mut self, force: bool) -> Result<()>;

    async fn set_mode(&mut self, name: &str) -> Result<()>;
}
