// Copyright (c) 2023 The Cocoon Authors

use crate::error::ConnectorError;
use cocoon_consul::ConsulClient;
use tracing::info;

/// Address the cocoon code serves HTTP on, seen from the proxy host
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Registers cocoons as frontends and backends of the reverse proxy
#[derive(Debug, Clone)]
pub struct Router {
    consul: ConsulClient,
    domain: String,
    backend_url: String,
}

/// KV pairs declaring the frontend `name`, routed on `<name>.<domain>`
pub fn frontend_pairs(name: &str, domain: &str) -> Vec<(String, String)> {
    let prefix = format!("traefik/frontends/{}", name);
    vec![
        (format!("{}/backend", prefix), name.to_string()),
        (format!("{}/entrypoints/0", prefix), "http".to_string()),
        (
            format!("{}/routes/main/rule", prefix),
            format!("Host:{}.{}", name, domain),
        ),
    ]
}

/// KV pairs adding `server` at `url` to the backend `backend`
pub fn backend_pairs(backend: &str, server: &str, url: &str) -> Vec<(String, String)> {
    let prefix = format!("traefik/backends/{}", backend);
    vec![
        (format!("{}/loadbalancer/method", prefix), "drr".to_string()),
        (format!("{}/servers/{}_server/url", prefix, server), url.to_string()),
        (format!("{}/servers/{}_server/weight", prefix, server), "10".to_string()),
    ]
}

impl Router {
    /// Router writing to `consul`
    pub fn new(consul: ConsulClient, domain: &str) -> Self {
        Router {
            consul,
            domain: domain.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }

    /// Pairs registering `cocoon_id`. A linked cocoon only joins the backend
    /// of the cocoon it links to.
    pub fn registration(&self, cocoon_id: &str, link: &str) -> Vec<(String, String)> {
        if link.is_empty() {
            let mut pairs = frontend_pairs(cocoon_id, &self.domain);
            pairs.extend(backend_pairs(cocoon_id, cocoon_id, &self.backend_url));
            pairs
        } else {
            backend_pairs(link, cocoon_id, &self.backend_url)
        }
    }

    /// Writes the registration of `cocoon_id` in one transaction
    pub async fn register(&self, cocoon_id: &str, link: &str) -> Result<(), ConnectorError> {
        self.consul.txn_set(&self.registration(cocoon_id, link)).await?;
        if link.is_empty() {
            info!("router: {} routed on {}.{}", cocoon_id, cocoon_id, self.domain);
        } else {
            info!("router: {} added as a backend of {}", cocoon_id, link);
        }
        Ok(())
    }
}
