// Copyright (c) 2023 The Cocoon Authors
//! Client of the consul-like HTTP service used for sessions, the KV store
//! (locks, router registry) and the service catalog (orderer discovery).
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

mod error;
pub use error::ConsulError;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// A KV entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvPair {
    /// full key
    pub key: String,
    /// base64 encoded value
    #[serde(default)]
    pub value: Option<String>,
    /// session holding the key
    #[serde(default)]
    pub session: Option<String>,
}

impl KvPair {
    /// Decoded value
    pub fn decoded_value(&self) -> Result<String, ConsulError> {
        match &self.value {
            None => Ok(String::new()),
            Some(v) => BASE64
                .decode(v)
                .map_err(|e| ConsulError::DecodeError(e.to_string()))
                .and_then(|b| {
                    String::from_utf8(b).map_err(|e| ConsulError::DecodeError(e.to_string()))
                }),
        }
    }
}

/// A catalog registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogService {
    /// node address
    #[serde(default)]
    pub address: String,
    /// service address, falls back to the node address when empty
    #[serde(default)]
    pub service_address: String,
    /// service port
    #[serde(default)]
    pub service_port: u16,
    /// service tags
    #[serde(default)]
    pub service_tags: Vec<String>,
}

impl CatalogService {
    /// `host:port` to dial
    pub fn addr(&self) -> String {
        let host = if self.service_address.is_empty() {
            &self.address
        } else {
            &self.service_address
        };
        format!("{}:{}", host, self.service_port)
    }
}

#[derive(Deserialize)]
struct SessionCreated {
    #[serde(rename = "ID")]
    id: String,
}

/// HTTP client of the service
#[derive(Debug, Clone)]
pub struct ConsulClient {
    base: String,
    http: reqwest::Client,
}

impl ConsulClient {
    /// `addr` is the base url, `http://127.0.0.1:8500` for example
    pub fn new(addr: &str, timeout: Duration) -> Result<Self, ConsulError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base = addr.trim_end_matches('/').to_string();
        if !base.starts_with("http://") && !base.starts_with("https://") {
            base = format!("http://{}", base);
        }
        Ok(ConsulClient { base, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base, path.trim_start_matches('/'))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ConsulError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ConsulError::StatusError(status.as_u16(), body))
    }

    /// Creates a session deleted with its keys when the TTL lapses
    pub async fn create_session(&self, ttl: Duration) -> Result<String, ConsulError> {
        let body = json!({
            "TTL": format!("{}s", ttl.as_secs()),
            "Behavior": "delete",
            "LockDelay": "0s",
        });
        let resp = self
            .http
            .put(self.url("session/create"))
            .json(&body)
            .send()
            .await?;
        let created: SessionCreated = Self::check(resp).await?.json().await?;
        debug!("consul session {} created", created.id);
        Ok(created.id)
    }

    /// Destroys a session, releasing its keys
    pub async fn destroy_session(&self, session: &str) -> Result<(), ConsulError> {
        let resp = self
            .http
            .put(self.url(&format!("session/destroy/{}", session)))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn kv_put_query(&self, key: &str, value: &str, query: &[(&str, &str)]) -> Result<bool, ConsulError> {
        let resp = self
            .http
            .put(self.url(&format!("kv/{}", key)))
            .query(query)
            .body(value.to_string())
            .send()
            .await?;
        let text = Self::check(resp).await?.text().await?;
        Ok(text.trim() == "true")
    }

    /// Sets a key
    pub async fn kv_put(&self, key: &str, value: &str) -> Result<bool, ConsulError> {
        self.kv_put_query(key, value, &[]).await
    }

    /// Takes `key` for `session`. `false` when another session holds it.
    pub async fn kv_acquire(&self, key: &str, value: &str, session: &str) -> Result<bool, ConsulError> {
        self.kv_put_query(key, value, &[("acquire", session)]).await
    }

    /// Frees `key` if `session` holds it
    pub async fn kv_release(&self, key: &str, session: &str) -> Result<bool, ConsulError> {
        self.kv_put_query(key, "", &[("release", session)]).await
    }

    /// Reads a key, `None` when absent
    pub async fn kv_get(&self, key: &str) -> Result<Option<KvPair>, ConsulError> {
        let resp = self.http.get(self.url(&format!("kv/{}", key))).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let pairs: Vec<KvPair> = Self::check(resp).await?.json().await?;
        Ok(pairs.into_iter().next())
    }

    /// Deletes every key under `prefix`
    pub async fn kv_delete_tree(&self, prefix: &str) -> Result<(), ConsulError> {
        let resp = self
            .http
            .delete(self.url(&format!("kv/{}", prefix)))
            .query(&[("recurse", "true")])
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Sets several keys atomically
    pub async fn txn_set(&self, pairs: &[(String, String)]) -> Result<(), ConsulError> {
        let resp = self
            .http
            .put(self.url("txn"))
            .json(&txn_set_body(pairs))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Registrations of a service, optionally filtered by tag
    pub async fn catalog_service(
        &self,
        name: &str,
        tag: Option<&str>,
    ) -> Result<Vec<CatalogService>, ConsulError> {
        let mut req = self.http.get(self.url(&format!("catalog/service/{}", name)));
        if let Some(tag) = tag {
            req = req.query(&[("tag", tag)]);
        }
        let resp = req.send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

fn txn_set_body(pairs: &[(String, String)]) -> serde_json::Value {
    serde_json::Value::Array(
        pairs
            .iter()
            .map(|(k, v)| json!({"KV": {"Verb": "set", "Key": k, "Value": BASE64.encode(v)}}))
            .collect(),
    )
}
