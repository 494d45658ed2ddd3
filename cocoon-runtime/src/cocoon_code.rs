// Copyright (c) 2023 The Cocoon Authors

use crate::link::Link;
use std::collections::HashMap;

/// An invoke request forwarded by the connector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// id of the invoke transaction
    pub tx_id: String,
    /// function to run
    pub function: String,
    /// positional arguments
    pub params: Vec<String>,
    /// request metadata set by the connector, e.g. `Structured` and `Body`
    /// for calls received over HTTP
    pub header: HashMap<String, String>,
}

/// User program run by the runtime
#[async_trait::async_trait]
pub trait CocoonCode: Send + Sync + 'static {
    /// Called once the connector had time to come up. An error stops the
    /// cocoon.
    async fn init(&self, link: &Link) -> anyhow::Result<()>;

    /// Runs `call.function`; the returned value is sent back as JSON
    async fn invoke(&self, link: &Link, call: Invocation) -> anyhow::Result<serde_json::Value>;
}
