//! Test Prediction Client
//!
//! Generates applicant payloads, sends them to the service over NATS
//! request-reply and logs each response.

use credit_score_service::feature_normalizer::REFERENCE_FEATURES;
use credit_score_service::types::Response;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Applicant payload generator for testing
struct ApplicantGenerator {
    rng: rand::rngs::ThreadRng,
}

impl ApplicantGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generate a complete applicant record
    fn generate(&mut self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("Age".into(), json!(self.rng.gen_range(18..80)));
        data.insert(
            "Annual_Income".into(),
            json!(round2(self.rng.gen_range(8000.0..180000.0))),
        );
        data.insert("Num_Bank_Accounts".into(), json!(self.rng.gen_range(0..10)));
        data.insert("Num_Credit_Card".into(), json!(self.rng.gen_range(0..11)));
        data.insert("Num_of_Delayed_Payment".into(), json!(self.rng.gen_range(0..25)));
        data.insert(
            "Credit_Utilization_Ratio".into(),
            json!(self.rng.gen_range(20.0..50.0)),
        );
        data.insert("Payment_of_Min_Amount".into(), json!(self.rng.gen_range(0..2)));
        data.insert(
            "Total_EMI_per_month".into(),
            json!(round2(self.rng.gen_range(0.0..1500.0))),
        );
        data.insert(
            "Credit_History_Age_Formated".into(),
            json!(self.rng.gen_range(1..400)),
        );
        for loan in &REFERENCE_FEATURES[9..17] {
            data.insert((*loan).into(), json!(self.rng.gen_range(0..2)));
        }
        data.insert("Missed_Payment_Day".into(), json!(self.rng.gen_range(0..30)));
        data
    }

    /// Same record with numbers sent as strings, as some callers do
    fn generate_stringly(&mut self) -> Map<String, Value> {
        self.generate()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v.to_string())))
            .collect()
    }

    /// Record with one feature removed
    fn generate_incomplete(&mut self) -> Map<String, Value> {
        let mut data = self.generate();
        let missing = REFERENCE_FEATURES[self.rng.gen_range(0..REFERENCE_FEATURES.len())];
        data.remove(missing);
        data
    }

    /// Build a request envelope, gateway-style half of the time
    fn request(&mut self, invalid_rate: f64) -> Value {
        let data = if self.rng.gen_bool(invalid_rate) {
            self.generate_incomplete()
        } else if self.rng.gen_bool(0.3) {
            self.generate_stringly()
        } else {
            self.generate()
        };

        if self.rng.gen_bool(0.5) {
            json!({ "body": json!({ "data": data }).to_string() })
        } else {
            json!({ "data": data })
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("credit_score.predict");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let invalid_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        invalid_rate = invalid_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, invalid_rate).await;
        }
    };

    let mut generator = ApplicantGenerator::new();
    let mut succeeded = 0;
    let mut rejected = 0;

    for i in 0..count {
        let request = generator.request(invalid_rate);
        let payload = serde_json::to_vec(&request)?;

        let reply = client.request(subject.to_string(), payload.into()).await?;
        let response: Response = serde_json::from_slice(&reply.payload)?;

        if response.is_success() {
            succeeded += 1;
        } else {
            rejected += 1;
        }
        info!(
            request = i + 1,
            status = response.status_code,
            body = %response.body,
            "Response received"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} succeeded, {} rejected)",
        count, succeeded, rejected
    );

    Ok(())
}

async fn run_dry_mode(count: u64, invalid_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ApplicantGenerator::new();
    for i in 0..count.min(3) {
        let json = serde_json::to_string_pretty(&generator.request(invalid_rate))?;
        info!("Sample request {}:\n{}", i + 1, json);
    }

    Ok(())
}
