//! # Head Node Client
//!
//! HTTP client for the cluster head node. One client serves both the
//! namespace/config/secret calls and the orchestrator's node status list.
//!
//! Failures are classified for the retry policy: connection errors, timeouts
//! and 5xx replies are `Unreachable` (retried), other non-success replies are
//! `Rejected`, and bodies that cannot be understood are `Malformed`.

use std::time::Duration;

use async_trait::async_trait;
use domains::{HeadNode, NamespaceAck, NodeStatus, NodeStatusSource, RemoteError};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

#[derive(Clone)]
pub struct HeadNodeClient {
    base: Url,
    client: Client,
}

impl HeadNodeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RemoteError::Rejected(format!("head node url {base_url:?}: {e}")))?;
        // `Url::join` replaces the last path segment unless the base ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Rejected(format!("http client: {e}")))?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|e| RemoteError::Rejected(format!("{path}: {e}")))
    }

    async fn get(&self, url: Url) -> Result<Response, RemoteError> {
        debug!(%url, "head node request");
        let resp = self.client.get(url).send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Unreachable(format!("{status}: {}", body.trim())));
        }
        Ok(resp)
    }

    async fn get_text(&self, url: Url) -> Result<String, RemoteError> {
        let resp = self.get(url).await?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(RemoteError::Rejected(format!("{status}: {}", body.trim())));
        }
        Ok(body)
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Malformed(err.to_string())
    } else {
        RemoteError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl HeadNode for HeadNodeClient {
    #[instrument(skip(self))]
    async fn create_namespace(&self, namespace: &str) -> Result<NamespaceAck, RemoteError> {
        let mut url = self.endpoint("make-user")?;
        url.query_pairs_mut().append_pair("user", namespace);
        let body = self.get_text(url).await?;
        parse_namespace_ack(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_config(&self, namespace: &str) -> Result<Option<String>, RemoteError> {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("user", namespace);
        let resp = self.get(url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(RemoteError::Rejected(format!("{status}: {}", body.trim())));
        }
        Ok(parse_config(body))
    }

    #[instrument(skip(self))]
    async fn fetch_join_secret(&self) -> Result<String, RemoteError> {
        let body = self.get_text(self.endpoint("get_secret")?).await?;
        parse_secret(&body)
    }
}

#[async_trait]
impl NodeStatusSource for HeadNodeClient {
    #[instrument(skip(self))]
    async fn get_node_status(&self) -> Result<Vec<NodeStatus>, RemoteError> {
        let body = self.get_text(self.endpoint("get_status")?).await?;
        parse_node_status(&body)
    }
}

#[derive(Deserialize)]
struct StatusReply {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// The head node answers `{"status": "Acknowledged"}` or `{"status": "Fail"}`.
/// Anything else (an empty body, a proxy error page, an unknown status) is
/// `Malformed`, so the user is left untouched and retried on the next pass.
pub fn parse_namespace_ack(body: &str) -> Result<NamespaceAck, RemoteError> {
    let reply: StatusReply = serde_json::from_str(body.trim())
        .map_err(|e| RemoteError::Malformed(format!("namespace ack: {e}")))?;
    match reply.status.to_ascii_lowercase().as_str() {
        "acknowledged" => Ok(NamespaceAck::Acknowledged),
        "fail" | "failure" => Ok(NamespaceAck::Failure {
            reason: reply.reason.unwrap_or(reply.status),
        }),
        other => Err(RemoteError::Malformed(format!("namespace ack status {other:?}"))),
    }
}

pub fn parse_config(body: String) -> Option<String> {
    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}

pub fn parse_secret(body: &str) -> Result<String, RemoteError> {
    match body.trim() {
        "" => Err(RemoteError::Malformed("empty join secret".into())),
        secret => Ok(secret.to_string()),
    }
}

#[derive(Deserialize)]
struct StatusEntry {
    node: Option<String>,
    #[serde(default)]
    ready: serde_json::Value,
}

/// Orchestrator readiness comes through as a bool or as the condition string
/// `"True"`/`"False"`/`"Unknown"`; a missing value means not ready. Entries
/// without a hostname are skipped. Any other value is `Malformed`.
pub fn parse_node_status(body: &str) -> Result<Vec<NodeStatus>, RemoteError> {
    let entries: Vec<StatusEntry> =
        serde_json::from_str(body).map_err(|e| RemoteError::Malformed(format!("node status: {e}")))?;
    let mut status = Vec::with_capacity(entries.len());
    for entry in entries {
        let ready = match &entry.ready {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Null => false,
            serde_json::Value::String(s) if s.eq_ignore_ascii_case("true") => true,
            serde_json::Value::String(s)
                if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("unknown") =>
            {
                false
            }
            other => {
                return Err(RemoteError::Malformed(format!("node ready value {other}")));
            }
        };
        if let Some(hostname) = entry.node {
            status.push(NodeStatus { hostname, ready });
        }
    }
    Ok(status)
}
