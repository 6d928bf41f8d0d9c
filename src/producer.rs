//! NATS publishers for responses and metric data

use crate::emitter::{MetricDatum, MetricsSink};
use crate::error::MetricsError;
use crate::types::envelope::Response;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Publishes responses to the reply subject of each request
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
}

impl ResponsePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a response to `reply`
    pub async fn publish(&self, reply: Subject, response: &Response) -> Result<()> {
        let payload = serde_json::to_vec(response)?;

        self.client.publish(reply.clone(), payload.into()).await?;

        debug!(
            reply = %reply,
            status = response.status_code,
            "Published response"
        );

        Ok(())
    }
}

/// Wire form of a metric datum on NATS
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetricMessage<'a> {
    namespace: &'a str,
    #[serde(flatten)]
    datum: &'a MetricDatum,
}

/// Metrics sink publishing each datum as JSON on a NATS subject.
///
/// Publishing is spawned on the runtime and not awaited.
pub struct NatsMetricsSink {
    client: Client,
    subject: String,
    runtime: Handle,
}

impl NatsMetricsSink {
    pub fn new(client: Client, subject: &str, runtime: Handle) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            runtime,
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl MetricsSink for NatsMetricsSink {
    fn put_metric(&self, namespace: &str, datum: MetricDatum) -> Result<(), MetricsError> {
        let payload = serde_json::to_vec(&MetricMessage {
            namespace,
            datum: &datum,
        })?;

        let client = self.client.clone();
        let subject = self.subject.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                warn!(error = %e, "Failed to publish metric");
            }
        });

        Ok(())
    }
}
