use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::client::MqttPublisher;
use super::message::decode_command;
use crate::config::MqttConfig;
use crate::controller::EventSender;
use crate::controller::OutboundMessage;
use crate::controller::PublishError;
use crate::controller::StatusSink;

/// Connects the controller to the home manager.
///
/// Commands on the command topic are decoded into control events and queued for the control
/// loop; outbound messages go to the status topic. Publishing goes through a separate handle so
/// it never waits for the poll task to release the client.
pub struct MqttBridge<C: MqttClient> {
    client: Arc<Mutex<C>>,
    publisher: Option<Arc<dyn MqttPublisher>>,
    command_topic: String,
    status_topic: String,
    /// Handle to the background message processing task
    message_task: Option<JoinHandle<()>>,
}

impl<C: MqttClient + 'static> MqttBridge<C> {
    pub fn new(client: C, config: &MqttConfig) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            publisher: None,
            command_topic: config.command_topic.clone(),
            status_topic: config.status_topic.clone(),
            message_task: None,
        }
    }

    /// Connect, subscribe to the command topic and start forwarding commands to `events`.
    pub async fn start(&mut self, events: EventSender) -> Result<(), Box<dyn Error + Send>> {
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
            client.subscribe(&self.command_topic).await?;
            self.publisher = Some(client.publisher()?);
        }
        info!("Subscribed to command topic {}", self.command_topic);

        self.message_task = Some(tokio::spawn(Self::process_messages_task(
            self.client.clone(),
            self.command_topic.clone(),
            events,
        )));
        Ok(())
    }

    async fn process_messages_task(
        client: Arc<Mutex<C>>,
        command_topic: String,
        events: EventSender,
    ) {
        loop {
            // Bounded poll so start() and tests can take the lock in between
            let msg = {
                let mut client_guard = client.lock().await;
                tokio::time::timeout(Duration::from_millis(100), client_guard.poll_message())
                    .await
                    .unwrap_or_default()
            };

            match msg {
                Some(msg) if msg.topic == command_topic => {
                    if !Self::handle_command(&msg, &events) {
                        info!("Control loop gone, stopping MQTT message processing");
                        return;
                    }
                }
                Some(msg) => debug!("Ignoring message on topic {}", msg.topic),
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// Returns false once the control loop has stopped listening.
    fn handle_command(msg: &MqttMessage, events: &EventSender) -> bool {
        match decode_command(&msg.payload) {
            Ok(event) => {
                debug!("Received command {:?}", event);
                events.send(event).is_ok()
            }
            Err(e) => {
                warn!(
                    "Ignoring command {:?}: {}",
                    String::from_utf8_lossy(&msg.payload),
                    e
                );
                true
            }
        }
    }
}

#[async_trait]
impl<C: MqttClient + 'static> StatusSink for MqttBridge<C> {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| PublishError::Transport("MQTT bridge not started".to_string()))?;
        let payload = message.to_json()?;
        publisher
            .publish(&self.status_topic, &payload, false)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

impl<C: MqttClient> Drop for MqttBridge<C> {
    fn drop(&mut self) {
        if let Some(task) = self.message_task.take() {
            task.abort();
        }
    }
}
