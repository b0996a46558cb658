//! Telephony dispatchers: the outbound side of a call.
//!
//! A dispatcher only places the call and returns the provider's dispatch id.
//! Whatever happens on the call afterwards comes back through
//! `POST /api/calls/{row_number}/events`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use carecall_core::config::TelephonyConfig;
use carecall_core::record::PatientRecord;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub trait Dispatcher: Send + Sync {
    /// Short name for logs and `/api/config`.
    fn name(&self) -> &'static str;

    /// Ask the provider to call `record`. Resolves to the dispatch id once
    /// the provider accepted the request.
    fn dispatch_call<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Pick the dispatcher the telephony section asks for.
pub fn from_config(cfg: &TelephonyConfig) -> anyhow::Result<Arc<dyn Dispatcher>> {
    match cfg.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookDispatcher::new(
            url,
            Duration::from_secs(cfg.timeout_secs.max(1)),
        )?)),
        _ => Ok(Arc::new(DryRunDispatcher)),
    }
}

// ---------------------------------------------------------------------------
// WebhookDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CallPayload<'a> {
    row_number: u32,
    name: &'a str,
    phone: &'a str,
    age: Option<u32>,
    gender: Option<&'a str>,
    address: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct CallAccepted {
    #[serde(default)]
    dispatch_id: Option<String>,
}

/// POSTs each call to an HTTP endpoint that fronts the telephony provider.
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn post(&self, record: &PatientRecord) -> anyhow::Result<String> {
        let payload = CallPayload {
            row_number: record.row_number,
            name: &record.name,
            phone: &record.phone,
            age: record.age,
            gender: record.gender.as_deref(),
            address: record.address.as_deref(),
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("webhook {} unreachable", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {}", body.trim());
        }

        // An empty or non-JSON body still counts as accepted.
        let accepted: CallAccepted = resp.json().await.unwrap_or_default();
        Ok(accepted
            .dispatch_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
    }
}

impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn dispatch_call<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(self.post(record))
    }
}

// ---------------------------------------------------------------------------
// DryRunDispatcher
// ---------------------------------------------------------------------------

/// Accepts every call without contacting anyone. Outcomes have to be reported
/// by hand (`carecall report ...`).
pub struct DryRunDispatcher;

impl Dispatcher for DryRunDispatcher {
    fn name(&self) -> &'static str {
        "dry_run"
    }

    fn dispatch_call<'a>(&'a self, record: &'a PatientRecord) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::info!(
                row_number = record.row_number,
                phone = %record.phone,
                dispatch_id = %id,
                "dry run: call not placed"
            );
            Ok(id)
        })
    }
}
