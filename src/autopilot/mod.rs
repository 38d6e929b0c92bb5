//! Autopilot Interface
//!
//! MAVLink client for the flight controller: connection and pump, telemetry
//! last-value caches, the command operations, and the ArduPlane mode table.

pub mod connection;
pub mod controller;
pub mod modes;
pub mod telemetry;

pub use connection::{AutopilotLink, MissionEvent};
pub use controller::AutopilotController;
pub use telemetry::{LandedState, TelemetryCache};
