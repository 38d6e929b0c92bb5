//! Mission Upload Protocol State
//!
//! The request/response upload is modeled as an explicit state object over
//! (remaining, sent, deadline) rather than ambient control flow, so retry
//! and idempotence behavior is testable without a connection. The driver
//! feeds it MISSION_REQUEST / MISSION_ACK observations and ticks.

use crate::error::{Error, Result};
use mavlink::ardupilotmega::MavMissionResult;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Base deadline: 10 s plus one second per ten items.
fn base_budget(count: u16) -> Duration {
    Duration::from_millis(10_000 + count as u64 * 100)
}

/// Extension granted for each valid request observed.
const REQUEST_EXTENSION: Duration = Duration::from_secs(10);

/// Tracks one upload in progress.
#[derive(Debug)]
pub struct UploadMachine {
    count: u16,
    remaining: HashSet<u16>,
    sent: HashSet<u16>,
    deadline: Instant,
}

impl UploadMachine {
    pub fn new(count: u16, now: Instant) -> Self {
        Self {
            count,
            remaining: (0..count).collect(),
            sent: HashSet::new(),
            deadline: now + base_budget(count),
        }
    }

    /// Handle a MISSION_REQUEST for `seq`. Returns the sequence to answer
    /// with; duplicates are answered again with the same content, and any
    /// in-range request extends the deadline.
    pub fn on_request(&mut self, seq: u16, now: Instant) -> Result<u16> {
        if seq >= self.count {
            return Err(Error::BadSequence(seq));
        }
        self.deadline = self.deadline.max(now) + REQUEST_EXTENSION;
        self.remaining.remove(&seq);
        self.sent.insert(seq);
        Ok(seq)
    }

    /// Handle the terminal MISSION_ACK.
    pub fn on_ack(&self, result: MavMissionResult) -> Result<()> {
        if result != MavMissionResult::MAV_MISSION_ACCEPTED {
            return Err(Error::UnexpectedAck(format!("{result:?}")));
        }
        if !self.remaining.is_empty() {
            return Err(Error::UnexpectedAck(format!(
                "accepted with {} item(s) never requested",
                self.remaining.len()
            )));
        }
        Ok(())
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn all_sent(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }
}
