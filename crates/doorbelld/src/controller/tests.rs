use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use super::sequence::AUTO_MESSAGE;
use super::sequence::AUTO_SECOND_MESSAGE;
use super::sequence::IDLE_MESSAGE;
use super::sequence::MANUAL_MESSAGE;
use super::testing::*;
use super::ControlEvent;
use super::DoorbellStatus;
use super::Exit;
use super::Lamp;
use super::Mode;
use super::OutboundMessage;
use super::TriggerSource;
use super::ENTRY_DOOR;
use crate::integrations::Notification;

const SIP_ADDRESS: &str = "sip:hall@pbx.local";

fn capture_at(hour: u32) -> PathBuf {
    PathBuf::from(format!("/captures/04June2024{hour:02}0000picturedump.jpg"))
}

fn message_file() -> PathBuf {
    PathBuf::from("/sounds/message.wav")
}

fn auto_trigger() -> ControlEvent {
    ControlEvent::AutoTrigger(TriggerSource::Remote)
}

fn manual_trigger() -> ControlEvent {
    ControlEvent::ManualTrigger(TriggerSource::Button)
}

fn entry_door(open: bool) -> ControlEvent {
    ControlEvent::DoorStatusChange {
        door: ENTRY_DOOR.to_string(),
        open,
    }
}

/// Harness already in a running Auto session at `now`, with the logs cleared.
async fn auto_session(config: crate::config::Config, now: chrono::NaiveDateTime) -> Harness {
    let mut h = Harness::new(config, now);
    h.controller.startup().await;
    h.send(auto_trigger());
    h.tick().await;
    h.calls.clear();
    h.sink.clear();
    h
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_startup_enters_idle() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;

    assert_eq!(h.controller.state().mode, Mode::Idle);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Blip));
    assert_eq!(
        h.sink.statuses(),
        vec![DoorbellStatus {
            idle: true,
            auto_possible: true,
            ..Default::default()
        }]
    );
    assert!(h.calls.calls().is_empty());
}

#[tokio::test]
async fn test_auto_on_startup() {
    let mut config = test_config();
    config.modes.auto_on_startup = true;
    let mut h = Harness::new(config, tuesday_at(10));

    h.controller.startup().await;
    assert_eq!(h.controller.state().mode, Mode::Auto);
    assert!(h.controller.state().auto_entry_pending);

    h.tick().await;
    assert!(!h.controller.state().auto_entry_pending);
    assert!(!h.controller.state().auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));
}

#[tokio::test(start_paused = true)]
async fn test_self_test_places_test_call() {
    let mut config = telephony_config();
    config.modes.startup_self_test = true;
    let mut h = Harness::new(config, tuesday_at(10));

    let start = Instant::now();
    h.controller.startup().await;

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(
        h.calls.calls(),
        vec![
            Call::StartTelephony,
            Call::Dial(SIP_ADDRESS.to_string()),
            Call::HangUp,
            Call::StopTelephony,
            // Idle entry
            Call::StopTelephony,
        ]
    );
}

#[tokio::test]
async fn test_self_test_without_telephony_captures() {
    let mut config = test_config();
    config.modes.startup_self_test = true;
    let mut h = Harness::new(config, tuesday_at(10));

    h.controller.startup().await;

    assert_eq!(h.calls.calls(), vec![Call::Capture(capture_at(10))]);
}

// =============================================================================
// Mode transitions
// =============================================================================

#[tokio::test]
async fn test_exactly_one_mode_across_triggers() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;

    let triggers = [
        manual_trigger(),
        auto_trigger(),
        auto_trigger(),
        manual_trigger(),
        manual_trigger(),
        auto_trigger(),
        manual_trigger(),
        auto_trigger(),
        entry_door(true),
        manual_trigger(),
        auto_trigger(),
    ];

    for trigger in triggers {
        h.send(trigger);
        h.tick().await;

        let status = h.controller.status();
        let enabled = [status.idle, status.automatic, status.manual];
        assert_eq!(enabled.iter().filter(|e| **e).count(), 1, "{status:?}");

        let expected = match h.controller.state().mode {
            Mode::Idle => [true, false, false],
            Mode::Auto => [false, true, false],
            Mode::Manual => [false, false, true],
        };
        assert_eq!(enabled, expected);
    }
}

#[tokio::test]
async fn test_manual_toggle() {
    let mut h = Harness::new(telephony_config(), tuesday_at(10));
    h.controller.startup().await;
    h.calls.clear();

    h.send(manual_trigger());
    h.tick().await;
    assert_eq!(h.controller.state().mode, Mode::Manual);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Off, Lamp::Solid));
    assert_eq!(h.calls.calls(), vec![Call::StartTelephony]);

    h.send(manual_trigger());
    h.tick().await;
    assert_eq!(h.controller.state().mode, Mode::Idle);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Blip));
    assert_eq!(
        h.calls.calls(),
        vec![Call::StartTelephony, Call::StopTelephony]
    );
}

#[tokio::test(start_paused = true)]
async fn test_auto_round_trip_returns_to_idle() {
    let mut h = auto_session(test_config(), tuesday_at(10)).await;
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));

    h.ring_bell().await;
    assert!(h.controller.state().triggered);

    h.send(auto_trigger());
    h.tick().await;

    let state = h.controller.state();
    assert_eq!(state.mode, Mode::Idle);
    assert!(!state.triggered);
    assert!(!state.auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Blip));
}

#[tokio::test]
async fn test_auto_entry_runs_when_already_permitted() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;
    h.ticks(2).await;
    assert!(h.controller.state().last_permission);

    h.send(auto_trigger());
    h.tick().await;

    assert_eq!(h.controller.state().mode, Mode::Auto);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));
    assert!(h.sink.statuses().last().unwrap().automatic);
}

#[tokio::test]
async fn test_auto_outside_hours_falls_back_to_manual() {
    let h = auto_session(telephony_config(), saturday_at(10)).await;

    let state = h.controller.state();
    assert_eq!(state.mode, Mode::Auto);
    assert!(state.auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Solid));

    let status = h.controller.status();
    assert!(status.automatic);
    assert!(!status.auto_possible);
}

#[tokio::test]
async fn test_permission_edges_while_auto_selected() {
    let mut h = auto_session(telephony_config(), tuesday_at(10)).await;

    h.clock.set(tuesday_at(20));
    h.tick().await;
    assert!(h.controller.state().auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Solid));
    assert_eq!(h.calls.calls(), vec![Call::StartTelephony]);

    // No edge, no entry action
    h.ticks(3).await;
    assert_eq!(h.calls.calls(), vec![Call::StartTelephony]);

    h.clock.set(tuesday_at(10));
    h.tick().await;
    assert_eq!(h.controller.state().mode, Mode::Auto);
    assert!(!h.controller.state().auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));
    assert_eq!(
        h.calls.calls(),
        vec![Call::StartTelephony, Call::StopTelephony]
    );
}

#[tokio::test]
async fn test_entry_door_blocks_auto() {
    let mut h = auto_session(test_config(), tuesday_at(10)).await;

    h.send(entry_door(true));
    h.tick().await;
    assert!(h.controller.state().door_open);
    assert!(h.controller.state().auto_fallback_active);
    assert!(!h.controller.status().auto_possible);

    h.send(entry_door(false));
    h.tick().await;
    assert!(!h.controller.state().auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));
}

#[tokio::test]
async fn test_other_doors_are_ignored() {
    let mut h = auto_session(test_config(), tuesday_at(10)).await;

    h.send(ControlEvent::DoorStatusChange {
        door: "Garage Door".to_string(),
        open: true,
    });
    h.tick().await;

    assert!(!h.controller.state().door_open);
    assert!(!h.controller.state().auto_fallback_active);
    assert!(h.sink.statuses().is_empty());
}

#[tokio::test]
async fn test_door_toggle_within_one_tick_sees_final_state() {
    let mut h = auto_session(telephony_config(), tuesday_at(10)).await;

    h.send(entry_door(true));
    h.send(entry_door(false));
    h.tick().await;

    let state = h.controller.state();
    assert!(!state.door_open);
    assert!(!state.auto_fallback_active);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Solid, Lamp::Off));
    assert!(h.calls.calls().is_empty());

    // Each door change is still reported
    let possible: Vec<bool> = h.sink.statuses().iter().map(|s| s.auto_possible).collect();
    assert_eq!(possible, vec![false, true]);
}

// =============================================================================
// Ring responses
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_ring_sequence() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;
    h.sink.clear();

    let start = Instant::now();
    h.ring_bell().await;

    assert!(start.elapsed() >= Duration::from_secs(25));
    assert_eq!(
        h.calls.calls(),
        vec![
            Call::Capture(capture_at(10)),
            Call::Notify(Notification::new(
                IDLE_MESSAGE,
                "magic",
                Some(capture_at(10))
            )),
        ]
    );

    let ringing: Vec<bool> = h.sink.statuses().iter().map(|s| s.ringing).collect();
    assert_eq!(ringing, vec![true, false]);
    assert!(!h.controller.state().triggered);
}

#[tokio::test(start_paused = true)]
async fn test_idle_ring_with_failing_notifier_clears_ringing() {
    let mut h = Harness::with_failing_notifier(test_config(), tuesday_at(10));
    h.controller.startup().await;

    h.ring_bell().await;

    assert_eq!(h.calls.notifications().len(), 1);
    assert!(!h.controller.state().ringing);
    assert!(!h.sink.statuses().last().unwrap().ringing);
}

#[tokio::test(start_paused = true)]
async fn test_auto_ring_sequence() {
    let mut h = auto_session(test_config(), tuesday_at(10)).await;

    h.ring_bell().await;

    assert_eq!(
        h.calls.calls(),
        vec![
            Call::Capture(capture_at(10)),
            Call::Play(message_file()),
            Call::DoorRelease(true),
            Call::DoorRelease(false),
            Call::Notify(Notification::new(
                AUTO_MESSAGE,
                "updown",
                Some(capture_at(10))
            )),
            Call::Capture(capture_at(10)),
            Call::Notify(Notification::new(
                AUTO_SECOND_MESSAGE,
                "magic",
                Some(capture_at(10))
            )),
        ]
    );

    let state = h.controller.state();
    assert_eq!(state.mode, Mode::Auto);
    assert!(state.triggered);
    assert!(!state.ringing);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blink, Lamp::Off));

    let statuses = h.sink.statuses();
    assert!(statuses[0].ringing && statuses[0].triggered && statuses[0].automatic);
    assert!(!statuses.last().unwrap().ringing);
}

#[tokio::test(start_paused = true)]
async fn test_auto_without_permission_uses_manual_sequence() {
    let mut h = auto_session(telephony_config(), tuesday_at(10)).await;
    h.clock.set(tuesday_at(20));
    h.tick().await;
    h.calls.clear();

    h.ring_bell().await;

    let calls = h.calls.calls();
    assert!(calls.contains(&Call::Dial(SIP_ADDRESS.to_string())));
    assert_eq!(h.calls.count(|c| matches!(c, Call::DoorRelease(_))), 0);
    assert_eq!(h.calls.count(|c| matches!(c, Call::Play(_))), 0);
    assert_eq!(
        h.calls.notifications(),
        vec![Notification::new(
            MANUAL_MESSAGE,
            "bugle",
            Some(capture_at(20))
        )]
    );

    assert_eq!(h.controller.state().mode, Mode::Auto);
    assert!(h.controller.state().triggered);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Blip, Lamp::Blink));
}

#[tokio::test(start_paused = true)]
async fn test_manual_ring_places_call() {
    let mut h = Harness::new(telephony_config(), tuesday_at(10));
    h.controller.startup().await;
    h.send(manual_trigger());
    h.tick().await;
    h.calls.clear();

    let start = Instant::now();
    h.ring_bell().await;

    assert!(start.elapsed() >= Duration::from_secs(35));
    assert_eq!(
        h.calls.calls(),
        vec![
            Call::Capture(capture_at(10)),
            Call::Dial(SIP_ADDRESS.to_string()),
            Call::HangUp,
            Call::Notify(Notification::new(
                MANUAL_MESSAGE,
                "bugle",
                Some(capture_at(10))
            )),
        ]
    );
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Off, Lamp::Blink));

    // A new manual session starts untriggered
    h.send(manual_trigger());
    h.tick().await;
    h.send(manual_trigger());
    h.tick().await;
    assert!(!h.controller.state().triggered);
    assert_eq!(h.indicator.pattern(), pattern(Lamp::Off, Lamp::Solid));
}

#[tokio::test(start_paused = true)]
async fn test_manual_ring_without_push() {
    let mut config = test_config();
    config.modes.push_in_manual_mode = false;
    let mut h = Harness::new(config, tuesday_at(10));
    h.controller.startup().await;
    h.send(manual_trigger());
    h.tick().await;

    h.ring_bell().await;

    assert_eq!(h.calls.calls(), vec![Call::Capture(capture_at(10))]);
}

#[tokio::test(start_paused = true)]
async fn test_held_ring_line_rings_once() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;

    h.set_ring_line(true);
    h.ticks(6).await;
    assert_eq!(h.calls.count(|c| matches!(c, Call::Capture(_))), 1);

    h.set_ring_line(false);
    h.tick().await;
    h.ring_bell().await;
    assert_eq!(h.calls.count(|c| matches!(c, Call::Capture(_))), 2);
}

#[tokio::test(start_paused = true)]
async fn test_open_door_suppresses_ring_sensor() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;

    // Line still active once the pulse ends: no ring until it has been seen idle
    h.send(ControlEvent::OpenDoor);
    h.set_ring_line(true);
    h.ticks(3).await;

    assert_eq!(
        h.calls.calls(),
        vec![Call::DoorRelease(true), Call::DoorRelease(false)]
    );

    h.set_ring_line(false);
    h.tick().await;
    h.ring_bell().await;
    assert_eq!(h.calls.count(|c| matches!(c, Call::Capture(_))), 1);
}

// =============================================================================
// Status publishing
// =============================================================================

#[tokio::test]
async fn test_baseline_status_every_tick() {
    let mut config = test_config();
    config.status.baseline_ticks = 1;
    let mut h = Harness::new(config, tuesday_at(10));
    h.controller.startup().await;

    h.ticks(3).await;

    assert_eq!(h.sink.statuses().len(), 4);
}

#[tokio::test]
async fn test_baseline_interval() {
    let mut config = test_config();
    config.status.baseline_ticks = 2;
    let mut h = Harness::new(config, tuesday_at(10));
    h.controller.startup().await;

    h.ticks(4).await;

    assert_eq!(h.sink.statuses().len(), 3);
}

#[tokio::test]
async fn test_status_published_on_change_without_baseline() {
    let mut h = Harness::new(test_config(), tuesday_at(18));
    h.controller.startup().await;
    h.ticks(3).await;
    assert_eq!(h.sink.statuses().len(), 1);

    // AutoPossible flips when the window closes
    h.clock.set(tuesday_at(19));
    h.tick().await;
    let statuses = h.sink.statuses();
    assert_eq!(statuses.len(), 2);
    assert!(!statuses[1].auto_possible);

    h.send(ControlEvent::UpdateStatus);
    h.tick().await;
    assert_eq!(h.sink.statuses().len(), 3);
}

#[tokio::test]
async fn test_status_receiver_tracks_published_status() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    let rx = h.controller.status_receiver();
    assert_eq!(*rx.borrow(), None);

    h.controller.startup().await;
    h.send(manual_trigger());
    h.tick().await;

    assert!(rx.borrow().unwrap().manual);
}

// =============================================================================
// Watchdog
// =============================================================================

#[tokio::test]
async fn test_heartbeat_and_acknowledgement() {
    let mut config = test_config();
    config.modes.heartbeat_enabled = true;
    let mut h = Harness::new(config, tuesday_at(10));
    h.controller.startup().await;

    h.ticks(2999).await;
    assert_eq!(h.controller.watchdog().counter(), 2999);
    let heartbeats = |h: &Harness| {
        h.sink
            .messages()
            .iter()
            .filter(|m| **m == OutboundMessage::Heartbeat)
            .count()
    };
    assert_eq!(heartbeats(&h), 0);

    h.controller.apply_event(ControlEvent::HeartbeatAck).await;
    assert_eq!(h.controller.watchdog().counter(), 0);

    h.ticks(3000).await;
    assert_eq!(heartbeats(&h), 1);
    assert_eq!(h.controller.watchdog().counter(), 3000);
}

#[tokio::test]
async fn test_watchdog_disabled_by_default() {
    let mut h = Harness::new(test_config(), tuesday_at(10));
    h.controller.startup().await;

    h.ticks(10).await;

    assert_eq!(h.controller.watchdog().counter(), 0);
    assert!(!h.controller.watchdog().is_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_loss_restarts_once() {
    let mut config = test_config();
    config.modes.heartbeat_enabled = true;
    config.watchdog.heartbeat_ticks = 3;
    config.watchdog.lost_ticks = 5;
    let Harness {
        controller,
        sink,
        indicator,
        ..
    } = Harness::new(config, tuesday_at(10));

    let start = Instant::now();
    let exit = controller.run().await;

    assert_eq!(exit, Exit::Restart);
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(!indicator.is_running());

    let messages = sink.messages();
    let restarts: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| **m == OutboundMessage::Restart)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(restarts, vec![messages.len() - 1]);
    assert_eq!(
        messages
            .iter()
            .filter(|m| **m == OutboundMessage::Heartbeat)
            .count(),
        1
    );

    let OutboundMessage::Status(last) = messages[messages.len() - 2] else {
        panic!("expected a final status before the restart");
    };
    assert!(last.terminated);
    assert!(!last.idle && !last.automatic && !last.manual);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_sequence() {
    let mut h = auto_session(test_config(), tuesday_at(10)).await;

    h.controller.shutdown().await;

    assert!(!h.indicator.is_running());
    assert_eq!(h.calls.calls(), vec![Call::DoorRelease(false)]);
    let last = *h.sink.statuses().last().unwrap();
    assert_eq!(
        last,
        DoorbellStatus {
            terminated: true,
            auto_possible: true,
            ..Default::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_door_pulse_relocks() {
    let h = Harness::new(test_config(), tuesday_at(10));
    h.send(ControlEvent::OpenDoor);

    let Harness {
        mut controller,
        calls,
        shutdown,
        ..
    } = h;

    let start = Instant::now();
    tokio::join!(controller.tick(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.send(true).unwrap();
    });

    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(
        calls.calls(),
        vec![Call::DoorRelease(true), Call::DoorRelease(false)]
    );
    assert!(!controller.ring_sensor().is_suppressed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_call_window() {
    let h = Harness::new(telephony_config(), tuesday_at(10));
    h.send(manual_trigger());
    h.set_ring_line(true);

    let Harness {
        controller,
        calls,
        sink,
        shutdown,
        ..
    } = h;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown.send(true).unwrap();
    });

    let start = Instant::now();
    let exit = controller.run().await;

    assert_eq!(exit, Exit::Shutdown);
    assert!(start.elapsed() < Duration::from_secs(35));
    assert_eq!(
        calls.calls(),
        vec![
            // Idle entry, then Manual entry
            Call::StopTelephony,
            Call::StartTelephony,
            Call::Capture(capture_at(10)),
            Call::Dial(SIP_ADDRESS.to_string()),
            Call::HangUp,
            Call::DoorRelease(false),
            Call::StopTelephony,
        ]
    );

    let last = *sink.statuses().last().unwrap();
    assert!(last.terminated);
    assert!(!last.ringing);
}
