// Copyright (c) 2023 The Cocoon Authors

use crate::error::CocoonError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

lazy_static! {
    static ref HOST_REGEX: Regex = Regex::new(
        r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .expect("valid host regex");
}

/// Outbound allow rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    /// IP or host
    pub destination: String,
    /// port
    pub destination_port: String,
    /// `tcp` or `udp`
    pub protocol: String,
}

/// Outbound allow list of a release
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Firewall(pub Vec<FirewallRule>);

impl PartialEq for Firewall {
    /// same rules, in any order
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|r| other.0.contains(r))
    }
}

impl Eq for Firewall {}

/// Whether `v` is an IP address or a host name
pub fn is_host(v: &str) -> bool {
    v.parse::<IpAddr>().is_ok() || HOST_REGEX.is_match(v)
}

impl Firewall {
    /// Rules without duplicates, first occurrence kept
    pub fn dedup(&self) -> Firewall {
        let mut rules: Vec<FirewallRule> = Vec::with_capacity(self.0.len());
        for rule in &self.0 {
            if !rules.contains(rule) {
                rules.push(rule.clone());
            }
        }
        Firewall(rules)
    }

    /// true when there is no rule
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds rules from loosely typed maps: `port` is accepted for `destinationPort`
    /// and the protocol defaults to `tcp`. Every invalid rule yields one message.
    pub fn from_maps(maps: &[BTreeMap<String, String>]) -> (Firewall, Vec<String>) {
        let mut errs = Vec::new();
        let mut rules = Vec::with_capacity(maps.len());
        for (i, rule) in maps.iter().enumerate() {
            let field = |name: &str| rule.get(name).cloned().unwrap_or_default();
            let destination = field("destination");
            if destination.is_empty() {
                errs.push(format!("rule {}: destination is required", i));
            } else if !is_host(&destination) {
                errs.push(format!("rule {}: destination is not a valid IP or host", i));
            }
            let mut port = field("port");
            if port.is_empty() {
                port = field("destinationPort");
            }
            if port.is_empty() {
                errs.push(format!("rule {}: port is required", i));
            }
            let mut protocol = field("protocol");
            if protocol.is_empty() {
                protocol = "tcp".to_string();
            } else if protocol != "tcp" && protocol != "udp" {
                errs.push(format!("rule {}: invalid protocol", i));
            }
            rules.push(FirewallRule {
                destination,
                destination_port: port,
                protocol,
            });
        }
        (Firewall(rules), errs)
    }

    /// Parses a JSON list of rules
    pub fn from_json(json: &str) -> Result<Firewall, CocoonError> {
        if json.is_empty() {
            return Err(CocoonError::InvalidFirewallRule("empty string passed".into()));
        }
        let maps: Vec<BTreeMap<String, String>> = serde_json::from_str(json)
            .map_err(|_| CocoonError::InvalidFirewallRule("malformed json".into()))?;
        let (firewall, errs) = Firewall::from_maps(&maps);
        match errs.into_iter().next() {
            Some(err) => Err(CocoonError::InvalidFirewallRule(err)),
            None => Ok(firewall),
        }
    }

    /// Checks every rule
    pub fn validate(&self) -> Result<(), CocoonError> {
        let maps: Vec<BTreeMap<String, String>> = self
            .0
            .iter()
            .map(|r| {
                BTreeMap::from([
                    ("destination".to_string(), r.destination.clone()),
                    ("destinationPort".to_string(), r.destination_port.clone()),
                    ("protocol".to_string(), r.protocol.clone()),
                ])
            })
            .collect();
        match Firewall::from_maps(&maps).1.into_iter().next() {
            Some(err) => Err(CocoonError::InvalidFirewallRule(format!("firewall: {}", err))),
            None => Ok(()),
        }
    }
}
