use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::config::MqttConfig;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Handle for publishing while another task polls this client
    ///
    /// Only valid after connect()
    fn publisher(&self) -> Result<Arc<dyn MqttPublisher>, Box<dyn Error + Send>>;

    /// Poll for the next message from subscribed topics
    ///
    /// Returns None if no message is available or if the client should stop
    async fn poll_message(&mut self) -> Option<MqttMessage>;
}

/// Send half of an MQTT client
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    /// Publish a message to an MQTT topic
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>>;
}

#[cfg(test)]
pub type PublishedLog = Arc<std::sync::Mutex<Vec<(String, Vec<u8>, bool)>>>;

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub messages: std::collections::VecDeque<MqttMessage>,
    pub subscriptions: Vec<String>,
    pub published: PublishedLog,
    pub is_connected: bool,
    /// Once the queue is empty, polls never complete, like a quiet broker
    pub hold_polls: bool,
}

#[cfg(test)]
#[derive(Debug)]
struct MockPublisher(PublishedLog);

#[cfg(test)]
#[async_trait]
impl MqttPublisher for MockPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.0
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publisher(&self) -> Result<Arc<dyn MqttPublisher>, Box<dyn Error + Send>> {
        Ok(Arc::new(MockPublisher(self.published.clone())))
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match self.messages.pop_front() {
            Some(msg) => Some(msg),
            None if self.hold_polls => std::future::pending().await,
            None => None,
        }
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, as (topic, payload, retain)
    pub fn published_messages(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.published.lock().unwrap().clone()
    }

    /// Queue a message for the next poll
    pub fn add_message(&mut self, topic: &str, payload: &[u8]) {
        self.messages.push_back(MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

/// Publishing handle sharing the rumqttc request channel
struct RumqttcPublisher(AsyncClient);

#[async_trait]
impl MqttPublisher for RumqttcPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.0
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        // The broker keeps our command subscription across reconnects
        mqtt_options.set_clean_session(false);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        }
    }

    fn connected_client(&self) -> Result<&AsyncClient, Box<dyn Error + Send>> {
        self.client.as_ref().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "MQTT client not connected. Call connect() first.",
            ))
        })
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        // Reconnection is rumqttc's job: keep polling after errors
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        // Send to channel; if receiver dropped, exit
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("Connected to MQTT broker ({:?})", ack.code);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.connected_client()?
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)
    }

    fn publisher(&self) -> Result<Arc<dyn MqttPublisher>, Box<dyn Error + Send>> {
        Ok(Arc::new(RumqttcPublisher(self.connected_client()?.clone())))
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
