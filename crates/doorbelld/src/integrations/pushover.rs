use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use tracing::info;
use tracing::warn;

use super::ActionError;
use super::Notification;
use super::Notifier;
use crate::config::PushoverConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends notifications through the Pushover message API
#[derive(Debug, Clone)]
pub struct Pushover {
    client: reqwest::Client,
    api_url: String,
    token: String,
    user: String,
}

impl Pushover {
    pub fn new(cfg: &PushoverConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: cfg.api_url.clone(),
            token: cfg.token.clone(),
            user: cfg.user.clone(),
        }
    }

    fn fields(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("title", notification.title.clone()),
            ("message", notification.message.clone()),
            ("sound", notification.sound.clone()),
        ]
    }
}

#[async_trait]
impl Notifier for Pushover {
    async fn send(&self, notification: &Notification) -> Result<(), ActionError> {
        info!("Sending Pushover message: {}", notification.message);
        let fields = self.fields(notification);
        let request = self.client.post(&self.api_url).timeout(REQUEST_TIMEOUT);

        let image = match &notification.attachment {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    // The message still goes out, just without the picture
                    warn!("{}", ActionError::Attachment(path.clone(), e));
                    None
                }
            },
            None => None,
        };

        let request = match image {
            Some(bytes) => {
                let image = Part::bytes(bytes)
                    .file_name("image.jpg")
                    .mime_str("image/jpeg")?;
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value))
                    .part("attachment", image);
                request.multipart(form)
            }
            None => request.form(&fields),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ActionError::Rejected(response.status()));
        }
        Ok(())
    }
}
