// Copyright (c) 2023 The Cocoon Authors

//! Platform records: cocoons, releases and identities.

use crate::acl::AclMap;
use crate::env::Env;
use crate::firewall::Firewall;
use crate::naming::sha256_hex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a cocoon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CocoonStatus {
    /// created, never deployed
    #[default]
    Created,
    /// deploy requested from the scheduler
    Started,
    /// connector is preparing the container
    Starting,
    /// source is being built
    Building,
    /// cocoon code is up
    Running,
    /// stopped by its owner or its connector
    Stopped,
    /// health checks failed
    Dead,
}

impl fmt::Display for CocoonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CocoonStatus::Created => "created",
            CocoonStatus::Started => "started",
            CocoonStatus::Starting => "starting",
            CocoonStatus::Building => "building",
            CocoonStatus::Running => "running",
            CocoonStatus::Stopped => "stopped",
            CocoonStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

impl FromStr for CocoonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown cocoon status ({})", s))
    }
}

/// Network usage accumulated by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// bytes received
    pub net_in: u64,
    /// bytes sent
    pub net_out: u64,
}

/// A deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Cocoon {
    /// unique id
    pub id: String,
    /// owning identity
    pub identity_id: String,
    #[serde(rename = "URL")]
    /// github repository url
    pub url: String,
    /// release tag or commit id, latest release when empty
    pub version: String,
    /// language of the source
    pub language: String,
    /// JSON build parameters
    pub build_param: String,
    /// memory in MB
    pub memory: u64,
    #[serde(rename = "CPUShare")]
    /// relative cpu weight
    pub cpu_share: u64,
    /// maximum number of signatories
    pub num_signatories: u32,
    /// approvals needed to deploy a release
    pub sig_threshold: u32,
    /// natively linked cocoon
    pub link: String,
    /// release ids, oldest first
    pub releases: Vec<String>,
    /// identity ids allowed to vote
    pub signatories: Vec<String>,
    /// lifecycle status
    pub status: CocoonStatus,
    #[serde(rename = "lastDeployedReleaseID")]
    /// release the connector last ran
    pub last_deployed_release_id: String,
    /// outbound allow rules
    pub firewall: Firewall,
    #[serde(rename = "ACL")]
    /// ledger access rules
    pub acl: AclMap,
    /// environment variables
    pub env: Env,
    /// network usage
    pub resource_usage: ResourceUsage,
    /// RFC 3339
    pub created_at: String,
}

impl Cocoon {
    /// Id of the most recent release
    pub fn latest_release_id(&self) -> Option<&str> {
        self.releases.last().map(String::as_str)
    }

    /// Whether `identity_id` may vote on releases
    pub fn is_signatory(&self, identity_id: &str) -> bool {
        self.signatories.iter().any(|s| s == identity_id)
    }

    /// The release fields of this cocoon as a new release
    pub fn to_release(&self, release_id: &str, created_at: &str) -> Release {
        Release {
            id: release_id.to_string(),
            cocoon_id: self.id.clone(),
            url: self.url.clone(),
            version: self.version.clone(),
            language: self.language.clone(),
            build_param: self.build_param.clone(),
            link: self.link.clone(),
            firewall: self.firewall.clone(),
            acl: self.acl.clone(),
            env: self.env.clone(),
            created_at: created_at.to_string(),
            ..Default::default()
        }
    }
}

/// An immutable deploy spec of a cocoon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Release {
    #[serde(rename = "ID")]
    /// unique id
    pub id: String,
    #[serde(rename = "cocoonID")]
    /// cocoon the release belongs to
    pub cocoon_id: String,
    #[serde(rename = "URL")]
    /// github repository url
    pub url: String,
    /// release tag or commit id, latest release when empty
    pub version: String,
    /// language of the source
    pub language: String,
    /// JSON build parameters
    pub build_param: String,
    /// natively linked cocoon
    pub link: String,
    /// approval votes
    pub sig_approved: u32,
    /// denial votes
    pub sig_denied: u32,
    #[serde(rename = "votersID")]
    /// identities that voted
    pub voters_id: Vec<String>,
    /// outbound allow rules
    pub firewall: Firewall,
    #[serde(rename = "ACL")]
    /// ledger access rules
    pub acl: AclMap,
    /// environment variables
    pub env: Env,
    /// RFC 3339
    pub created_at: String,
}

impl Release {
    /// Whether any deploy field differs from `other`
    pub fn deploy_fields_differ(&self, other: &Release) -> bool {
        self.url != other.url
            || self.version != other.version
            || self.language != other.language
            || self.build_param != other.build_param
            || self.link != other.link
            || self.firewall != other.firewall
            || self.acl != other.acl
            || self.env != other.env
    }

    /// Whether `identity_id` already voted
    pub fn has_voted(&self, identity_id: &str) -> bool {
        self.voters_id.iter().any(|v| v == identity_id)
    }
}

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct Identity {
    /// login email
    pub email: String,
    /// hashed once stored
    pub password: String,
    /// owned cocoon ids
    pub cocoons: Vec<String>,
    /// login session ids
    pub client_sessions: Vec<String>,
    /// RFC 3339
    pub created_at: String,
}

impl Identity {
    /// New identity with a clear text password
    pub fn new(email: &str, password: &str) -> Self {
        Identity {
            email: email.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    /// `sha256(lowercase(trim(email)))`
    pub fn id(&self) -> String {
        identity_id(&self.email)
    }
}

/// Identity id of an email
/// ```
/// # use cocoon_models::cocoon::identity_id;
/// assert_eq!(identity_id(" A@b.C "), identity_id("a@b.c"));
/// ```
pub fn identity_id(email: &str) -> String {
    sha256_hex(email.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(CocoonStatus::Running.to_string(), "running");
        assert_eq!("dead".parse::<CocoonStatus>().unwrap(), CocoonStatus::Dead);
        assert!("zombie".parse::<CocoonStatus>().is_err());
    }

    #[test]
    fn release_change_detection() {
        let cocoon = Cocoon {
            id: "c1".into(),
            url: "https://github.com/o/r".into(),
            ..Default::default()
        };
        let a = cocoon.to_release("r1", "now");
        let mut b = a.clone();
        b.id = "r2".into();
        b.sig_approved = 3;
        assert!(!a.deploy_fields_differ(&b));
        b.version = "v2".into();
        assert!(a.deploy_fields_differ(&b));
    }
}
