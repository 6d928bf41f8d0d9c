//! NATS consumer for incoming prediction requests

use crate::error::ExtractError;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use serde_json::Value;
use tracing::info;

/// Consumer for receiving prediction requests from NATS
pub struct RequestConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl RequestConsumer {
    /// Create a new request consumer
    pub fn new(client: Client, subject: &str, queue_group: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
        }
    }

    /// Subscribe to the request subject; replicas share the queue group
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await?;
        info!(subject = %self.subject, queue_group = %self.queue_group, "Subscribed to request subject");
        Ok(subscriber)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a message payload into a request envelope
pub fn decode_request(payload: &[u8]) -> Result<Value, ExtractError> {
    serde_json::from_slice(payload).map_err(|e| ExtractError::InvalidBody(e.to_string()))
}
