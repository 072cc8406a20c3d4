use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::clock::Clock;
use super::event::ControlEvent;
use super::event::EventReceiver;
use super::event::TriggerSource;
use super::event::ENTRY_DOOR;
use super::indicator::IndicatorBoard;
use super::indicator::Lamp;
use super::ring::RingEvent;
use super::ring::RingSensor;
use super::schedule::Schedule;
use super::sequence;
use super::sequence::Actions;
use super::sequence::SequenceOutcome;
use super::sequence::SequenceRunner;
use super::sequence::Step;
use super::sequence::DOOR_PULSE;
use super::status::DoorbellStatus;
use super::status::OutboundMessage;
use super::status::StatusPublisher;
use super::status::StatusSink;
use super::watchdog::Watchdog;
use super::watchdog::WatchdogAction;
use crate::config::Config;
use crate::integrations::gpio::DoorIo;
use crate::integrations::AudioPlayer;
use crate::integrations::Camera;
use crate::integrations::Notifier;
use crate::integrations::Telephony;

/// Control loop period
pub const CONTROL_TICK: Duration = Duration::from_millis(50);

/// Time between announcing a restart and re-executing
pub const RESTART_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum Mode {
    #[default]
    Idle,
    Auto,
    Manual,
}

/// Everything the state machine knows. Only the control loop mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub mode: Mode,

    /// A ring was handled in the current mode session
    pub triggered: bool,

    /// A ring-response sequence is running
    pub ringing: bool,

    pub door_open: bool,

    /// Auto permission seen on the previous tick
    pub last_permission: bool,

    /// Auto is selected but not permitted; rings take the Manual sequence
    pub auto_fallback_active: bool,

    /// Auto was just selected; the next tick runs an entry action unconditionally
    pub auto_entry_pending: bool,

    pub terminated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    SupervisorLost,
}

/// Why [`Controller::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    /// The supervisor stopped answering; the process should re-execute itself
    Restart,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub telephony_in_manual_mode: bool,
    pub push_in_manual_mode: bool,
    pub auto_on_startup: bool,
    pub startup_self_test: bool,
    pub baseline_ticks: u32,
    pub tick: Duration,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            telephony_in_manual_mode: config.modes.telephony_in_manual_mode,
            push_in_manual_mode: config.modes.push_in_manual_mode,
            auto_on_startup: config.modes.auto_on_startup,
            startup_self_test: config.modes.startup_self_test,
            baseline_ticks: config.status.baseline_ticks,
            tick: CONTROL_TICK,
        }
    }
}

/// The controller's view of the outside world
pub struct Collaborators {
    pub camera: Arc<dyn Camera>,
    pub player: Arc<dyn AudioPlayer>,
    pub telephony: Arc<dyn Telephony>,
    pub notifier: Arc<dyn Notifier>,
    pub door: Box<dyn DoorIo>,
    pub status: Arc<dyn StatusSink>,
    pub clock: Arc<dyn Clock>,
}

/// The doorbell state machine and its control loop.
///
/// Each tick drains queued [`ControlEvent`]s, re-evaluates Auto permission, samples the ring
/// line (running a response sequence to completion when it fires), advances the watchdog and
/// publishes status.
pub struct Controller {
    settings: ControllerSettings,
    schedule: Schedule,
    actions: Actions,
    door: Box<dyn DoorIo>,
    ring: RingSensor,
    indicator: Arc<IndicatorBoard>,
    publisher: StatusPublisher,
    watchdog: Watchdog,
    clock: Arc<dyn Clock>,
    events: EventReceiver,
    shutdown: watch::Receiver<bool>,
    state: ControllerState,
    ticks: u64,
}

impl Controller {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
        indicator: Arc<IndicatorBoard>,
        events: EventReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let actions = Actions {
            camera: collaborators.camera,
            player: collaborators.player,
            telephony: collaborators.telephony,
            notifier: collaborators.notifier,
            capture_directory: config.media.capture_directory.clone(),
            auto_message_file: config.media.auto_message_file.clone(),
            sip_address: config.telephony.sip_address.clone(),
        };

        Self {
            settings: ControllerSettings::from(config),
            schedule: Schedule::from(&config.schedule),
            actions,
            door: collaborators.door,
            ring: RingSensor::default(),
            indicator,
            publisher: StatusPublisher::new(collaborators.status),
            watchdog: Watchdog::from_config(config.modes.heartbeat_enabled, &config.watchdog),
            clock: collaborators.clock,
            events,
            shutdown,
            state: ControllerState::default(),
            ticks: 0,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn ring_sensor(&self) -> &RingSensor {
        &self.ring
    }

    /// Receiver for every status snapshot the controller publishes
    pub fn status_receiver(&self) -> watch::Receiver<Option<DoorbellStatus>> {
        self.publisher.subscribe()
    }

    pub fn status(&self) -> DoorbellStatus {
        let state = &self.state;
        let active = !state.terminated;
        DoorbellStatus {
            idle: active && state.mode == Mode::Idle,
            automatic: active && state.mode == Mode::Auto,
            auto_possible: self.schedule.permits(self.clock.now(), state.door_open),
            manual: active && state.mode == Mode::Manual,
            triggered: state.triggered,
            terminated: state.terminated,
            ringing: state.ringing,
        }
    }

    async fn publish_status(&self) {
        self.publisher.publish(self.status()).await;
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Startup self-test, initial Idle entry and the optional Auto selection.
    pub async fn startup(&mut self) {
        info!("Doorbell monitor started");
        info!("{}", self.schedule.describe());

        if self.settings.startup_self_test {
            info!("Running startup self-test");
            let steps = sequence::self_test_sequence(self.settings.telephony_in_manual_mode);
            self.run_steps(&steps).await;
        }

        self.enter_idle().await;
        if self.settings.auto_on_startup {
            self.on_auto_trigger(TriggerSource::Startup).await;
        }
    }

    /// Run until shutdown is requested or the supervisor is lost.
    pub async fn run(mut self) -> Exit {
        self.startup().await;

        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.shutdown_requested() {
                self.shutdown().await;
                return Exit::Shutdown;
            }

            tokio::select! {
                _ = interval.tick() => {}
                Ok(_) = self.shutdown.wait_for(|stop| *stop) => continue,
            }

            if self.tick().await == TickOutcome::SupervisorLost {
                warn!("Supervisor stopped acknowledging heartbeats, restarting");
                self.shutdown().await;
                self.publisher.send(OutboundMessage::Restart).await;
                tokio::time::sleep(RESTART_GRACE).await;
                return Exit::Restart;
            }
        }
    }

    /// One control loop iteration.
    pub async fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;

        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event).await;
        }

        let now = self.clock.now();
        let permitted = self.schedule.permits(now, self.state.door_open);
        if self.state.mode == Mode::Auto {
            self.update_auto_session(permitted).await;
        }
        self.state.last_permission = permitted;

        let line = self.door.ring_active();
        if let Some(ring) = self.ring.sample(line, now) {
            self.respond_to_ring(ring).await;
        }

        match self.watchdog.tick() {
            WatchdogAction::None => {}
            WatchdogAction::SendHeartbeat => {
                debug!("Sending heartbeat");
                self.publisher.send(OutboundMessage::Heartbeat).await;
            }
            WatchdogAction::SupervisorLost => return TickOutcome::SupervisorLost,
        }

        let baseline = self.settings.baseline_ticks;
        if baseline != 0 && self.ticks % u64::from(baseline) == 0 {
            self.publish_status().await;
        } else {
            self.publisher.publish_if_changed(self.status()).await;
        }

        TickOutcome::Continue
    }

    pub async fn apply_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::AutoTrigger(source) => self.on_auto_trigger(source).await,
            ControlEvent::ManualTrigger(source) => self.on_manual_trigger(source).await,
            ControlEvent::OpenDoor => {
                info!("Remote door open requested");
                self.run_steps(&[Step::PulseDoor(DOOR_PULSE)]).await;
            }
            ControlEvent::UpdateStatus => self.publish_status().await,
            ControlEvent::DoorStatusChange { door, open } => {
                if door != ENTRY_DOOR {
                    debug!("Ignoring state change of {}", door);
                    return;
                }
                info!("{} {}", door, if open { "opened" } else { "closed" });
                self.state.door_open = open;
                self.publish_status().await;
            }
            ControlEvent::HeartbeatAck => {
                debug!("Heartbeat acknowledged at {}", self.watchdog.counter());
                self.watchdog.acknowledge();
            }
        }
    }

    async fn on_manual_trigger(&mut self, source: TriggerSource) {
        info!("Manual trigger ({})", source);
        self.state.triggered = false;
        if self.state.mode == Mode::Manual {
            self.enter_idle().await;
        } else {
            info!("Entering Manual mode");
            self.state.mode = Mode::Manual;
            self.state.auto_fallback_active = false;
            self.state.auto_entry_pending = false;
            self.enter_manual(false).await;
        }
    }

    async fn on_auto_trigger(&mut self, source: TriggerSource) {
        info!("Auto trigger ({})", source);
        self.state.triggered = false;
        if self.state.mode == Mode::Auto {
            self.enter_idle().await;
        } else {
            info!("Entering Auto mode");
            self.state.mode = Mode::Auto;
            self.state.auto_fallback_active = false;
            self.state.auto_entry_pending = true;
        }
    }

    /// Entry actions for permission edges while Auto is selected.
    async fn update_auto_session(&mut self, permitted: bool) {
        let pending = std::mem::take(&mut self.state.auto_entry_pending);
        let previous = self.state.last_permission;

        if permitted && (pending || !previous) {
            self.enter_auto_session().await;
        } else if !permitted && (pending || previous) {
            self.enter_auto_fallback().await;
        }
    }

    async fn enter_idle(&mut self) {
        info!("Entering Idle mode");
        self.state.mode = Mode::Idle;
        self.state.triggered = false;
        self.state.auto_fallback_active = false;
        self.state.auto_entry_pending = false;
        self.indicator.show(Lamp::Blip, Lamp::Blip);
        if self.settings.telephony_in_manual_mode {
            self.run_steps(&[Step::StopTelephony]).await;
        }
        self.publish_status().await;
    }

    /// Manual session entry, either selected directly or as the Auto fallback.
    async fn enter_manual(&mut self, fallback: bool) {
        let manual = if self.state.triggered {
            Lamp::Blink
        } else {
            Lamp::Solid
        };
        let auto = if fallback { Lamp::Blip } else { Lamp::Off };
        self.indicator.show(auto, manual);
        if self.settings.telephony_in_manual_mode {
            self.run_steps(&[Step::StartTelephony]).await;
        }
        self.publish_status().await;
    }

    async fn enter_auto_session(&mut self) {
        info!("Auto mode answering the door");
        self.state.auto_fallback_active = false;
        let auto = if self.state.triggered {
            Lamp::Blink
        } else {
            Lamp::Solid
        };
        self.indicator.show(auto, Lamp::Off);
        if self.settings.telephony_in_manual_mode {
            self.run_steps(&[Step::StopTelephony]).await;
        }
        self.publish_status().await;
    }

    async fn enter_auto_fallback(&mut self) {
        if self.state.door_open {
            info!("Auto mode not possible while the entry door is open, falling back to manual");
        } else {
            info!("Auto mode not possible at this time, falling back to manual");
        }
        self.state.auto_fallback_active = true;
        self.enter_manual(true).await;
    }

    async fn respond_to_ring(&mut self, ring: RingEvent) {
        match self.state.mode {
            Mode::Idle => {
                info!("Someone rang the bell at {}", ring.at);
                self.state.ringing = true;
                self.publish_status().await;
                self.run_steps(&sequence::idle_sequence()).await;
            }
            Mode::Auto if !self.state.auto_fallback_active => {
                info!("Someone rang the bell while in auto mode at {}", ring.at);
                self.state.ringing = true;
                self.state.triggered = true;
                self.indicator.show(Lamp::Blink, Lamp::Off);
                self.publish_status().await;
                self.run_steps(&sequence::auto_sequence()).await;
            }
            Mode::Auto | Mode::Manual => {
                info!("Someone rang the bell while in manual mode at {}", ring.at);
                self.state.ringing = true;
                self.state.triggered = true;
                self.indicator.show_manual(Lamp::Blink);
                self.publish_status().await;
                let steps = sequence::manual_sequence(
                    self.settings.telephony_in_manual_mode,
                    self.settings.push_in_manual_mode,
                );
                self.run_steps(&steps).await;
            }
        }

        self.state.ringing = false;
        self.publish_status().await;
    }

    async fn run_steps(&mut self, steps: &[Step]) -> SequenceOutcome {
        let mut runner = SequenceRunner::new(
            &self.actions,
            &mut *self.door,
            &mut self.ring,
            &mut self.shutdown,
            &*self.clock,
        );
        runner.run(steps).await
    }

    /// Leave the active mode, stop the indicator and announce termination.
    pub async fn shutdown(&mut self) {
        info!("Doorbell monitor stopping");
        self.indicator.stop();
        self.door.set_door_release(false);
        if self.settings.telephony_in_manual_mode {
            self.run_steps(&[Step::StopTelephony]).await;
        }

        self.state = ControllerState {
            mode: Mode::Idle,
            door_open: self.state.door_open,
            last_permission: self.state.last_permission,
            terminated: true,
            ..Default::default()
        };
        self.publish_status().await;
    }
}
