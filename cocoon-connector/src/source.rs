// Copyright (c) 2023 The Cocoon Authors

//! Source download and firewall scripts run inside the cocoon container.

use crate::error::ConnectorError;
use crate::language::Language;
use cocoon_models::firewall::Firewall;
use cocoon_models::validation::{github_repo_parts, is_github_commit_id, is_github_repo_url};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::debug;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tarball_url: String,
}

/// Resolves the source archives of public github repositories
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: reqwest::Client,
    api_base: String,
}

impl SourceFetcher {
    /// Fetcher using the public github API
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_api_base(http, GITHUB_API)
    }

    /// Fetcher using the API at `api_base`
    pub fn with_api_base(http: reqwest::Client, api_base: &str) -> Self {
        SourceFetcher {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Tarball url of `version` of the repository at `url`.
    ///
    /// A 40 character hex version is a commit id, any other non empty
    /// version is a release tag and an empty one is the latest release.
    pub async fn tarball_url(&self, url: &str, version: &str) -> Result<String, ConnectorError> {
        if !is_github_repo_url(url) {
            return Err(ConnectorError::FetchError(
                "only public source code hosted on github is supported".into(),
            ));
        }
        let (owner, repo) = github_repo_parts(url)
            .ok_or_else(|| ConnectorError::FetchError(format!("invalid repository url: {}", url)))?;
        if is_github_commit_id(version) {
            debug!("downloading repo with commit id = {}", version);
            return Ok(format!(
                "{}/repos/{}/{}/tarball/{}",
                self.api_base, owner, repo, version
            ));
        }
        let release_url = if version.is_empty() {
            debug!("downloading latest repo release");
            format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo)
        } else {
            debug!("downloading repo with release tag = {}", version);
            format!("{}/repos/{}/{}/releases/tags/{}", self.api_base, owner, repo, version)
        };
        let resp = self
            .http
            .get(&release_url)
            .header(reqwest::header::USER_AGENT, "cocoon-connector")
            .send()
            .await
            .map_err(|e| ConnectorError::FetchError(format!("failed to fetch release: {}", e)))?;
        if !resp.status().is_success() {
            return Err(ConnectorError::FetchError(format!(
                "failed to fetch release from github repo: status {}",
                resp.status()
            )));
        }
        let release: GithubRelease = resp
            .json()
            .await
            .map_err(|e| ConnectorError::FetchError(format!("malformed release: {}", e)))?;
        Ok(release.tarball_url)
    }
}

/// Script downloading `tarball_url` and moving its content to the source root.
/// The firewall is reset first so the download host is reachable.
pub fn fetch_script(lang: &dyn Language, cocoon_id: &str, tarball_url: &str) -> String {
    let dst = lang.download_destination();
    let file = format!("{}/{}.tar.gz", dst, cocoon_id);
    let root = lang.source_root_dir();
    [
        "iptables -F".to_string(),
        format!("rm -rf {}", dst),
        format!("mkdir -p {}", dst),
        format!("wget {} -O {} &> /dev/null", tarball_url, file),
        format!("tar -xvf {} -C {} --strip-components 1 &> /dev/null", file, dst),
        format!("rm -rf {}", file),
        format!("mkdir -p {}", root),
        format!("mv {}/* {}", dst, root),
    ]
    .join(" && ")
}

/// Default deny script opening the connector, DNS and the release's rules
pub fn firewall_script(connector_addr: SocketAddr, cocoon_code_port: u16, firewall: &Firewall) -> String {
    let ip = connector_addr.ip();
    let port = connector_addr.port();
    let mut cmds = vec![
        "iptables -F".to_string(),
        "iptables -P INPUT DROP".to_string(),
        "iptables -P FORWARD DROP".to_string(),
        "iptables -P OUTPUT DROP".to_string(),
        "iptables -A OUTPUT -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT".to_string(),
        format!("iptables -A OUTPUT -p tcp -d {} --dport {} -j ACCEPT", ip, port),
        "iptables -A OUTPUT -p udp --dport 53 -j ACCEPT".to_string(),
    ];
    for rule in &firewall.dedup().0 {
        let protocol = if rule.protocol.is_empty() { "tcp" } else { &rule.protocol };
        cmds.push(format!(
            "iptables -A OUTPUT -p {} -d {} --dport {} -j ACCEPT",
            protocol, rule.destination, rule.destination_port
        ));
    }
    cmds.push("iptables -A INPUT -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT".to_string());
    cmds.push(format!(
        "iptables -A INPUT -p tcp -s {} --dport {} -j ACCEPT",
        ip, cocoon_code_port
    ));
    // the policy lines must not abort the script
    let (reset, rest) = cmds.split_at(1);
    format!("{} && {}", reset[0], rest.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::GoLanguage;
    use assert_matches::assert_matches;
    use axum::{extract::Path, routing::get, Json, Router};
    use cocoon_models::firewall::FirewallRule;
    use serde_json::json;

    #[test]
    fn fetch_script_unpacks_into_source_root() {
        let lang = GoLanguage::new("c1", "https://github.com/ncodes/cocoon-example-01", false).unwrap();
        let script = fetch_script(&lang, "c1", "https://x/tarball/v1");
        assert!(script.starts_with("iptables -F && rm -rf "));
        assert!(script.contains("wget https://x/tarball/v1 -O "));
        assert!(script.contains("c1.tar.gz"));
        assert!(script.ends_with("/* /go/src/github.com/ncodes/cocoon-example-01"));
    }

    #[test]
    fn firewall_script_denies_by_default() {
        let firewall = Firewall(vec![
            FirewallRule {
                destination: "google.com".into(),
                destination_port: "443".into(),
                protocol: "tcp".into(),
            },
            FirewallRule {
                destination: "google.com".into(),
                destination_port: "443".into(),
                protocol: "tcp".into(),
            },
            FirewallRule {
                destination: "8.8.4.4".into(),
                destination_port: "53".into(),
                protocol: "udp".into(),
            },
        ]);
        let script = firewall_script("172.17.0.1:8002".parse().unwrap(), 8000, &firewall);
        assert!(script.starts_with("iptables -F && iptables -P INPUT DROP; iptables -P FORWARD DROP; iptables -P OUTPUT DROP;"));
        assert!(script.contains("iptables -A OUTPUT -p tcp -d 172.17.0.1 --dport 8002 -j ACCEPT"));
        assert!(script.contains("iptables -A OUTPUT -p udp --dport 53 -j ACCEPT"));
        assert_eq!(script.matches("-d google.com --dport 443").count(), 1);
        assert!(script.contains("iptables -A OUTPUT -p udp -d 8.8.4.4 --dport 53 -j ACCEPT"));
        assert!(script.ends_with("iptables -A INPUT -p tcp -s 172.17.0.1 --dport 8000 -j ACCEPT"));
    }

    #[tokio::test]
    async fn tarball_urls() {
        let app = Router::new()
            .route(
                "/repos/:owner/:repo/releases/latest",
                get(|Path((owner, repo)): Path<(String, String)>| async move {
                    Json(json!({"tarball_url": format!("https://t/{}/{}/latest", owner, repo)}))
                }),
            )
            .route(
                "/repos/:owner/:repo/releases/tags/:tag",
                get(|Path((_, _, tag)): Path<(String, String, String)>| async move {
                    Json(json!({"tarball_url": format!("https://t/{}", tag)}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let fetcher = SourceFetcher::with_api_base(reqwest::Client::new(), &format!("http://{}", addr));
        let url = "https://github.com/ncodes/cocoon-example-01";
        assert_eq!(
            fetcher.tarball_url(url, "").await.unwrap(),
            "https://t/ncodes/cocoon-example-01/latest"
        );
        assert_eq!(fetcher.tarball_url(url, "v0.1.0").await.unwrap(), "https://t/v0.1.0");
        let commit = "e1d0f7e1a6f21c1a9bff3a1bdf2a2a1e3e0d9c1f";
        assert_eq!(
            fetcher.tarball_url(url, commit).await.unwrap(),
            format!("http://{}/repos/ncodes/cocoon-example-01/tarball/{}", addr, commit)
        );
        assert_matches!(
            fetcher.tarball_url("https://gitlab.com/a/b", "").await,
            Err(ConnectorError::FetchError(_))
        );
    }
}
