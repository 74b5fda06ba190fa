//! Harvest agent invocation.
//!
//! One request, one response. Every outcome is folded into
//! `Result<HarvestResult, InvocationError>` so callers never branch on raw
//! transport or payload shapes.

mod http;

pub use http::{AgentConfig, HttpTransport};

use crate::model::{AgentEnvelope, HarvestRequest, HarvestResult, ScanDateRange};
use async_trait::async_trait;
use tracing::{info, warn};

/// Shown when the agent declines without saying why.
pub const REJECTED_FALLBACK: &str = "The harvest agent declined the request.";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("agent gateway reported failure: {0}")]
    Gateway(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// Connectivity, timeout or non-2xx. Retryable by resubmitting.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The agent answered and declined; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),
    /// The agent claimed success but the result did not match the expected shape.
    #[error("malformed agent response: {0}")]
    MalformedResponse(String),
}

/// The injected request/response boundary. Any bounded waiting is the transport's job.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Send the serialized harvest request and return the raw response envelope.
    async fn send(&self, message: String) -> Result<serde_json::Value, TransportError>;
}

pub struct AgentClient<T> {
    transport: T,
}

impl<T: AgentTransport> AgentClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Run one harvest. Callers validate `list_name` and `domains` beforehand.
    pub async fn invoke(
        &self,
        list_name: &str,
        domains: &[String],
        range: ScanDateRange,
    ) -> Result<HarvestResult, InvocationError> {
        let request = HarvestRequest::new(list_name, domains, range);
        let message = serde_json::to_string(&request)
            .map_err(|e| InvocationError::Transport(format!("encode request: {e}")))?;

        info!(list_name, domains = domains.len(), %range, "invoking harvest agent");
        let raw = self.transport.send(message).await.map_err(|e| {
            warn!(list_name, error = %e, "harvest transport failed");
            InvocationError::Transport(e.to_string())
        })?;

        let outcome = classify_envelope(raw);
        match &outcome {
            Ok(result) => info!(
                list_name = %result.list_name,
                total_contacts = result.total_contacts,
                "harvest succeeded"
            ),
            Err(InvocationError::Rejected(msg)) => warn!(list_name, reason = %msg, "harvest rejected"),
            Err(e) => warn!(list_name, error = %e, "harvest response unusable"),
        }
        outcome
    }
}

/// Classify a raw response envelope as success, rejection or contract violation.
pub fn classify_envelope(raw: serde_json::Value) -> Result<HarvestResult, InvocationError> {
    let envelope: AgentEnvelope = serde_json::from_value(raw)
        .map_err(|e| InvocationError::MalformedResponse(format!("envelope: {e}")))?;

    if envelope.status.as_ref().and_then(|s| s.as_str()) != Some("success") {
        let message = envelope
            .message
            .as_ref()
            .and_then(|m| m.as_str())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map_or_else(|| REJECTED_FALLBACK.to_string(), str::to_string);
        return Err(InvocationError::Rejected(message));
    }

    let payload = envelope
        .result
        .ok_or_else(|| InvocationError::MalformedResponse("missing result".into()))?;
    let result: HarvestResult = serde_json::from_value(payload)
        .map_err(|e| InvocationError::MalformedResponse(format!("result: {e}")))?;
    result
        .validate()
        .map_err(InvocationError::MalformedResponse)?;
    Ok(result)
}
