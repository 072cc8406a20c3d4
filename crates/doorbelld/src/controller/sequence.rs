//! Ring-response sequences.
//!
//! A sequence is a flat list of [`Step`]s. The runner checks the shutdown signal between steps
//! and races every wait against it. Once shutdown is seen, the remaining steps are skipped
//! except cleanup steps (hang-up, stopping the SIP agent); the door pulse always releases the
//! relay. Collaborator failures are logged and the sequence carries on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::clock::Clock;
use super::ring::RingSensor;
use crate::integrations::gpio::DoorIo;
use crate::integrations::media::capture_path;
use crate::integrations::AudioPlayer;
use crate::integrations::Camera;
use crate::integrations::Notification;
use crate::integrations::Notifier;
use crate::integrations::Telephony;

/// Delay between the ring and the first picture
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// How long the door release stays energised
pub const DOOR_PULSE: Duration = Duration::from_secs(3);

/// How long a manual-mode call is held before hanging up
pub const CALL_WINDOW: Duration = Duration::from_secs(30);

/// How long Ringing stays raised after an idle-mode alert
pub const IDLE_HOLD: Duration = Duration::from_secs(20);

/// Startup self-test: SIP agent warm-up, then test call duration
pub const SELF_TEST_WARMUP: Duration = Duration::from_secs(5);
pub const SELF_TEST_CALL: Duration = Duration::from_secs(25);

pub const IDLE_MESSAGE: &str = "Doorbell is ringing while in idle mode";
pub const AUTO_MESSAGE: &str = "Doorbell is ringing while in auto mode";
pub const AUTO_SECOND_MESSAGE: &str = "Second Auto Mode picture capture";
pub const MANUAL_MESSAGE: &str = "Doorbell rang while in manual mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait(Duration),
    /// Take a picture; it becomes the attachment of following notifications
    Capture,
    PlayMessage,
    /// Unlock the door for the given time with the ring sensor suppressed
    PulseDoor(Duration),
    Notify {
        message: &'static str,
        sound: &'static str,
    },
    StartTelephony,
    StopTelephony,
    Dial,
    HangUp,
}

impl Step {
    /// Steps that still run after shutdown was requested
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Step::HangUp | Step::StopTelephony)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed,
    Cancelled,
}

pub fn idle_sequence() -> Vec<Step> {
    vec![
        Step::Wait(SETTLE_DELAY),
        Step::Capture,
        Step::Notify {
            message: IDLE_MESSAGE,
            sound: "magic",
        },
        Step::Wait(IDLE_HOLD),
    ]
}

pub fn auto_sequence() -> Vec<Step> {
    vec![
        Step::Wait(SETTLE_DELAY),
        Step::Capture,
        Step::PlayMessage,
        Step::PulseDoor(DOOR_PULSE),
        Step::Notify {
            message: AUTO_MESSAGE,
            sound: "updown",
        },
        Step::Capture,
        Step::Notify {
            message: AUTO_SECOND_MESSAGE,
            sound: "magic",
        },
    ]
}

pub fn manual_sequence(telephony: bool, push_notification: bool) -> Vec<Step> {
    let mut steps = vec![Step::Wait(SETTLE_DELAY), Step::Capture];
    if telephony {
        steps.extend([Step::Dial, Step::Wait(CALL_WINDOW), Step::HangUp]);
    }
    if push_notification {
        steps.push(Step::Notify {
            message: MANUAL_MESSAGE,
            sound: "bugle",
        });
    }
    steps
}

/// Test call through the SIP bridge, or a single test picture without one.
pub fn self_test_sequence(telephony: bool) -> Vec<Step> {
    if telephony {
        vec![
            Step::StartTelephony,
            Step::Wait(SELF_TEST_WARMUP),
            Step::Dial,
            Step::Wait(SELF_TEST_CALL),
            Step::HangUp,
            Step::StopTelephony,
        ]
    } else {
        vec![Step::Capture]
    }
}

/// Collaborators and settings the steps act on.
pub struct Actions {
    pub camera: Arc<dyn Camera>,
    pub player: Arc<dyn AudioPlayer>,
    pub telephony: Arc<dyn Telephony>,
    pub notifier: Arc<dyn Notifier>,
    pub capture_directory: PathBuf,
    pub auto_message_file: PathBuf,
    pub sip_address: Option<String>,
}

/// Runs one sequence against the controller's hardware and collaborators.
pub struct SequenceRunner<'a> {
    pub actions: &'a Actions,
    pub door: &'a mut dyn DoorIo,
    pub ring: &'a mut RingSensor,
    pub shutdown: &'a mut watch::Receiver<bool>,
    pub clock: &'a dyn Clock,
    last_capture: Option<PathBuf>,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(
        actions: &'a Actions,
        door: &'a mut dyn DoorIo,
        ring: &'a mut RingSensor,
        shutdown: &'a mut watch::Receiver<bool>,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            actions,
            door,
            ring,
            shutdown,
            clock,
            last_capture: None,
        }
    }

    pub async fn run(&mut self, steps: &[Step]) -> SequenceOutcome {
        let mut outcome = SequenceOutcome::Completed;

        for step in steps {
            if outcome == SequenceOutcome::Completed && self.shutdown_requested() {
                info!("Shutdown requested, abandoning sequence");
                outcome = SequenceOutcome::Cancelled;
            }
            if outcome == SequenceOutcome::Cancelled && !step.is_cleanup() {
                debug!("Skipping {:?}", step);
                continue;
            }

            if !self.run_step(*step).await {
                outcome = SequenceOutcome::Cancelled;
            }
        }

        outcome
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep unless shutdown arrives first. Returns false if interrupted.
    async fn wait(&mut self, duration: Duration) -> bool {
        if self.shutdown_requested() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            Ok(_) = self.shutdown.wait_for(|stop| *stop) => false,
        }
    }

    /// Returns false if the step was cut short by shutdown.
    async fn run_step(&mut self, step: Step) -> bool {
        match step {
            Step::Wait(duration) => return self.wait(duration).await,
            Step::Capture => {
                let path = capture_path(&self.actions.capture_directory, self.clock.now());
                info!("Capturing picture in {}", path.display());
                match self.actions.camera.capture(&path).await {
                    Ok(()) => self.last_capture = Some(path),
                    Err(e) => {
                        warn!("Picture capture failed: {}", e);
                        self.last_capture = None;
                    }
                }
            }
            Step::PlayMessage => {
                info!("Playing message");
                if let Err(e) = self.actions.player.play(&self.actions.auto_message_file).await {
                    warn!("Message playback failed: {}", e);
                }
            }
            Step::PulseDoor(duration) => {
                self.ring.suppress();
                self.door.set_door_release(true);
                info!("Door unlocked");
                let completed = self.wait(duration).await;
                self.door.set_door_release(false);
                info!("Door locked");
                self.ring.release();
                return completed;
            }
            Step::Notify { message, sound } => {
                let notification = Notification::new(message, sound, self.last_capture.clone());
                if let Err(e) = self.actions.notifier.send(&notification).await {
                    warn!("Notification failed: {}", e);
                }
            }
            Step::StartTelephony => {
                if let Err(e) = self.actions.telephony.start_service().await {
                    warn!("Failed to start telephony: {}", e);
                }
            }
            Step::StopTelephony => {
                if let Err(e) = self.actions.telephony.stop_service().await {
                    warn!("Failed to stop telephony: {}", e);
                }
            }
            Step::Dial => match &self.actions.sip_address {
                Some(address) => {
                    info!("Calling {}", address);
                    if let Err(e) = self.actions.telephony.dial(address).await {
                        warn!("Call failed: {}", e);
                    }
                }
                None => warn!("No SIP address configured, not calling"),
            },
            Step::HangUp => {
                info!("Terminating call");
                if let Err(e) = self.actions.telephony.hang_up().await {
                    warn!("Failed to hang up: {}", e);
                }
            }
        }
        true
    }
}
