//! Airdrop Release Trigger
//!
//! Drives the payload-bay servo. During a normal mission the release fires
//! from the DO_SET_SERVO item inside the airdrop plan; the direct
//! [`AirdropTrigger::release`] path exists for manual firing, and
//! [`AirdropTrigger::reset`] re-closes the bay for reload between drops.

use crate::autopilot::AutopilotController;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

/// Minimum time the bay stays open during a direct release.
pub const RELEASE_DWELL: Duration = Duration::from_millis(1500);

/// Anything that can drive a servo output.
#[async_trait]
pub trait ServoControl: Send + Sync {
    async fn set_servo(&self, index: u8, pwm: u16) -> Result<()>;
}

#[async_trait]
impl ServoControl for AutopilotController {
    async fn set_servo(&self, index: u8, pwm: u16) -> Result<()> {
        AutopilotController::set_servo(self, index, pwm).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AirdropTrigger {
    pub servo: u8,
    pub open_pwm: u16,
    pub close_pwm: u16,
}

impl AirdropTrigger {
    pub fn new(servo: u8, open_pwm: u16, close_pwm: u16) -> Self {
        Self {
            servo,
            open_pwm,
            close_pwm,
        }
    }

    /// Open the bay, hold it open for [`RELEASE_DWELL`], close it again.
    pub async fn release(&self, servo: &dyn ServoControl) -> Result<()> {
        servo.set_servo(self.servo, self.open_pwm).await?;
        sleep(RELEASE_DWELL).await;
        servo.set_servo(self.servo, self.close_pwm).await
    }

    /// Drive the bay to the closed/loaded position.
    pub async fn reset(&self, servo: &dyn ServoControl) -> Result<()> {
        servo.set_servo(self.servo, self.close_pwm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingServo {
        commands: Mutex<Vec<(u8, u16)>>,
    }

    #[async_trait]
    impl ServoControl for RecordingServo {
        async fn set_servo(&self, index: u8, pwm: u16) -> Result<()> {
            self.commands.lock().unwrap().push((index, pwm));
            Ok(())
        }
    }

    #[tokio::test]
    async fn release_opens_then_closes() {
        let servo = RecordingServo::default();
        let trigger = AirdropTrigger::new(9, 1900, 1100);
        trigger.release(&servo).await.unwrap();
        assert_eq!(*servo.commands.lock().unwrap(), vec![(9, 1900), (9, 1100)]);
    }

    #[tokio::test]
    async fn reset_closes_the_bay() {
        let servo = RecordingServo::default();
        let trigger = AirdropTrigger::new(9, 1900, 1100);
        trigger.reset(&servo).await.unwrap();
        assert_eq!(*servo.commands.lock().unwrap(), vec![(9, 1100)]);
    }
}
