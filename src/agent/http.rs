use super::{AgentTransport, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngCore;
use serde::Serialize;
use std::time::Duration;

/// Connection settings for the agent gateway.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_url: String,
    pub agent_id: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    agent_id: &'a str,
    request_id: String,
    message: String,
}

/// Production transport: one POST to the agent gateway.
pub struct HttpTransport {
    http: reqwest::Client,
    cfg: AgentConfig,
}

impl HttpTransport {
    pub fn new(cfg: AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn send(&self, message: String) -> Result<serde_json::Value, TransportError> {
        let body = GatewayRequest {
            agent_id: &self.cfg.agent_id,
            request_id: gen_request_id(),
            message,
        };
        tracing::debug!(url = %self.cfg.agent_url, request_id = %body.request_id, "posting to agent gateway");

        let mut req = self.http.post(&self.cfg.agent_url).json(&body);
        if let Some(key) = self.cfg.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&text, 200),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        unwrap_gateway_response(body)
    }
}

/// Generate a random request ID for correlating gateway logs.
fn gen_request_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}

/// Strip the gateway wrapper `{success, response, error}` down to the agent envelope.
pub(crate) fn unwrap_gateway_response(
    body: serde_json::Value,
) -> Result<serde_json::Value, TransportError> {
    let Some(obj) = body.as_object() else {
        return Err(TransportError::Gateway("response body is not an object".into()));
    };

    match obj.get("success").and_then(|v| v.as_bool()) {
        Some(false) => {
            let reason = obj
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("agent call failed");
            Err(TransportError::Gateway(reason.to_string()))
        }
        Some(true) => match obj.get("response") {
            // Some agents answer with the envelope JSON-encoded as a string.
            Some(serde_json::Value::String(s)) => Ok(serde_json::from_str(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.clone()))),
            Some(v) => Ok(v.clone()),
            None => Err(TransportError::Gateway("missing response".into())),
        },
        None if obj.contains_key("status") => Ok(body),
        None => Err(TransportError::Gateway("unrecognised response body".into())),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}
