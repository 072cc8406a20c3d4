//! Recording collaborators and a harness that drives a [`Controller`] tick by tick.

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use tokio::sync::watch;

use super::event_channel;
use super::indicator::DEFAULT_CYCLE_LENGTH;
use super::Clock;
use super::Collaborators;
use super::ControlEvent;
use super::Controller;
use super::DoorbellStatus;
use super::EventSender;
use super::IndicatorBoard;
use super::IndicatorPattern;
use super::Lamp;
use super::OutboundMessage;
use super::PublishError;
use super::StatusSink;
use crate::config::Config;
use crate::integrations::gpio::DoorIo;
use crate::integrations::ActionError;
use crate::integrations::AudioPlayer;
use crate::integrations::Camera;
use crate::integrations::Notification;
use crate::integrations::Notifier;
use crate::integrations::Telephony;

/// Tuesday 2024-06-04 at `hour`:00
pub fn tuesday_at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 4)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Saturday 2024-06-08 at `hour`:00
pub fn saturday_at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 8)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

pub fn pattern(auto: Lamp, manual: Lamp) -> IndicatorPattern {
    IndicatorPattern::new(auto, manual, DEFAULT_CYCLE_LENGTH)
}

#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Every collaborator call, in order, across all recording mocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Capture(PathBuf),
    Play(PathBuf),
    StartTelephony,
    StopTelephony,
    Dial(String),
    HangUp,
    Notify(Notification),
    DoorRelease(bool),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

fn failure(program: &str) -> ActionError {
    ActionError::Spawn {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
    }
}

/// Records every call into a shared [`CallLog`]; `failing` makes the notifier return errors.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: CallLog,
    failing_notifier: bool,
}

#[async_trait]
impl Camera for Recorder {
    async fn capture(&self, path: &Path) -> Result<(), ActionError> {
        self.log.push(Call::Capture(path.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl AudioPlayer for Recorder {
    async fn play(&self, file: &Path) -> Result<(), ActionError> {
        self.log.push(Call::Play(file.to_path_buf()));
        Ok(())
    }
}

#[async_trait]
impl Telephony for Recorder {
    async fn start_service(&self) -> Result<(), ActionError> {
        self.log.push(Call::StartTelephony);
        Ok(())
    }

    async fn stop_service(&self) -> Result<(), ActionError> {
        self.log.push(Call::StopTelephony);
        Ok(())
    }

    async fn dial(&self, address: &str) -> Result<(), ActionError> {
        self.log.push(Call::Dial(address.to_string()));
        Ok(())
    }

    async fn hang_up(&self) -> Result<(), ActionError> {
        self.log.push(Call::HangUp);
        Ok(())
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn send(&self, notification: &Notification) -> Result<(), ActionError> {
        self.log.push(Call::Notify(notification.clone()));
        if self.failing_notifier {
            return Err(failure("pushover"));
        }
        Ok(())
    }
}

struct RecordingDoor {
    ring: Arc<AtomicBool>,
    log: CallLog,
}

impl DoorIo for RecordingDoor {
    fn ring_active(&mut self) -> bool {
        self.ring.load(Ordering::Relaxed)
    }

    fn set_door_release(&mut self, energised: bool) {
        self.log.push(Call::DoorRelease(energised));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<OutboundMessage>>>);

impl RecordingSink {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.0.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<DoorbellStatus> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        self.0.lock().unwrap().push(*message);
        Ok(())
    }
}

/// Config for controller tests: no self-test, no baseline publishing, notifications on.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.modes.startup_self_test = false;
    config.status.baseline_ticks = 0;
    config.media.capture_directory = PathBuf::from("/captures");
    config.media.auto_message_file = PathBuf::from("/sounds/message.wav");
    config
}

/// Config with the SIP bridge enabled in manual mode
pub fn telephony_config() -> Config {
    let mut config = test_config();
    config.modes.telephony_in_manual_mode = true;
    config.telephony.sip_address = Some("sip:hall@pbx.local".to_string());
    config
}

pub struct Harness {
    pub controller: Controller,
    pub calls: CallLog,
    pub sink: RecordingSink,
    pub clock: Arc<FixedClock>,
    pub indicator: Arc<IndicatorBoard>,
    pub events: EventSender,
    pub shutdown: watch::Sender<bool>,
    ring: Arc<AtomicBool>,
}

impl Harness {
    pub fn new(config: Config, now: NaiveDateTime) -> Self {
        Self::build(config, now, false)
    }

    pub fn with_failing_notifier(config: Config, now: NaiveDateTime) -> Self {
        Self::build(config, now, true)
    }

    fn build(config: Config, now: NaiveDateTime, failing_notifier: bool) -> Self {
        let calls = CallLog::default();
        let recorder = Arc::new(Recorder {
            log: calls.clone(),
            failing_notifier,
        });
        let ring = Arc::new(AtomicBool::new(false));
        let sink = RecordingSink::default();
        let clock = Arc::new(FixedClock::new(now));
        let indicator = Arc::new(IndicatorBoard::new(
            DEFAULT_CYCLE_LENGTH,
            pattern(Lamp::Blink, Lamp::Blink),
        ));
        let (events, receiver) = event_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let collaborators = Collaborators {
            camera: recorder.clone(),
            player: recorder.clone(),
            telephony: recorder.clone(),
            notifier: recorder,
            door: Box::new(RecordingDoor {
                ring: ring.clone(),
                log: calls.clone(),
            }),
            status: Arc::new(sink.clone()),
            clock: clock.clone(),
        };

        let controller = Controller::new(
            &config,
            collaborators,
            indicator.clone(),
            receiver,
            shutdown_rx,
        );

        Self {
            controller,
            calls,
            sink,
            clock,
            indicator,
            events,
            shutdown,
            ring,
        }
    }

    pub fn send(&self, event: ControlEvent) {
        self.events.send(event).unwrap();
    }

    pub fn set_ring_line(&self, active: bool) {
        self.ring.store(active, Ordering::Relaxed);
    }

    pub async fn tick(&mut self) {
        self.controller.tick().await;
    }

    pub async fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.controller.tick().await;
        }
    }

    /// Press and release the bell; the response sequence runs inside these ticks.
    pub async fn ring_bell(&mut self) {
        self.set_ring_line(true);
        self.ticks(2).await;
        self.set_ring_line(false);
        self.tick().await;
    }
}
