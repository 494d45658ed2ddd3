// Copyright (c) 2023 The Cocoon Authors

//! Access control maps and their interpreter.
//!
//! A map looks like `{"*": "deny-put", "ledger": "allow", "other": {"<actorID>": "allow-get"}}`.
//! Rules apply in the order wildcard, ledger, actor. Every matching privilege
//! overrides the decision reached so far, starting from the default policy.

use crate::error::CocoonError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ledger operations subject to access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// create a ledger
    CreateLedger,
    /// add transactions
    Put,
    /// read a ledger
    GetLedger,
    /// read a transaction by key
    Get,
    /// read a transaction by id
    GetById,
    /// read a block
    GetBlockById,
    /// scan a key range
    RangeGet,
}

impl Operation {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateLedger => "CREATE_LEDGER",
            Operation::Put => "PUT",
            Operation::GetLedger => "GET_LEDGER",
            Operation::Get => "GET",
            Operation::GetById => "GET_BY_ID",
            Operation::GetBlockById => "GET_BLOCK_BY_ID",
            Operation::RangeGet => "RANGE_GET",
        }
    }

    /// Read operations, covered by `allow-get`/`deny-get`
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Operation::GetLedger
                | Operation::Get
                | Operation::GetById
                | Operation::GetBlockById
                | Operation::RangeGet
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CocoonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATE_LEDGER" => Operation::CreateLedger,
            "PUT" => Operation::Put,
            "GET_LEDGER" => Operation::GetLedger,
            "GET" => Operation::Get,
            "GET_BY_ID" => Operation::GetById,
            "GET_BLOCK_BY_ID" => Operation::GetBlockById,
            "RANGE_GET" => Operation::RangeGet,
            other => {
                return Err(CocoonError::InvalidArgument(format!(
                    "unsupported operation ({})",
                    other
                )))
            }
        })
    }
}

/// A single privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// allow everything
    Allow,
    /// deny everything
    Deny,
    /// allow ledger creation
    AllowCreateLedger,
    /// allow puts
    AllowPut,
    /// allow reads
    AllowGet,
    /// deny ledger creation
    DenyCreateLedger,
    /// deny puts
    DenyPut,
    /// deny reads
    DenyGet,
}

impl FromStr for Privilege {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "allow" => Privilege::Allow,
            "deny" => Privilege::Deny,
            "allow-create-ledger" => Privilege::AllowCreateLedger,
            "allow-put" => Privilege::AllowPut,
            "allow-get" => Privilege::AllowGet,
            "deny-create-ledger" => Privilege::DenyCreateLedger,
            "deny-put" => Privilege::DenyPut,
            "deny-get" => Privilege::DenyGet,
            _ => return Err(()),
        })
    }
}

impl Privilege {
    /// `Some(true)` to permit, `Some(false)` to deny, `None` when the privilege says nothing
    /// about the operation
    pub fn decide(&self, op: Operation) -> Option<bool> {
        match self {
            Privilege::Allow => Some(true),
            Privilege::Deny => Some(false),
            Privilege::AllowCreateLedger if op == Operation::CreateLedger => Some(true),
            Privilege::DenyCreateLedger if op == Operation::CreateLedger => Some(false),
            Privilege::AllowGet if op.is_read() => Some(true),
            Privilege::DenyGet if op.is_read() => Some(false),
            Privilege::AllowPut if op == Operation::Put => Some(true),
            Privilege::DenyPut if op == Operation::Put => Some(false),
            _ => None,
        }
    }
}

/// Whether `p` names a privilege
pub fn is_valid_privilege(p: &str) -> bool {
    Privilege::from_str(p).is_ok()
}

/// ACL rules of a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AclMap(pub BTreeMap<String, Value>);

impl AclMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object
    pub fn from_json(json: &str) -> Result<Self, CocoonError> {
        serde_json::from_str(json).map_err(|e| CocoonError::InvalidACL(format!("malformed acl: {}", e)))
    }

    /// true when no rule is defined
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sets the privileges of `ledger` or `ledger.actorID`
    pub fn add(&mut self, target: &str, privileges: &str) -> Result<(), CocoonError> {
        let parts: Vec<&str> = target.split('.').collect();
        match parts.as_slice() {
            [ledger] => {
                self.0
                    .insert(ledger.to_string(), Value::String(privileges.to_string()));
            }
            [ledger, actor] => {
                let entry = self
                    .0
                    .entry(ledger.to_string())
                    .or_insert_with(|| Value::Object(Default::default()));
                if !entry.is_object() {
                    *entry = Value::Object(Default::default());
                }
                if let Value::Object(actors) = entry {
                    actors.insert(actor.to_string(), Value::String(privileges.to_string()));
                }
            }
            _ => {
                return Err(CocoonError::InvalidACL(
                    "target format is invalid".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Removes the rule of `ledger` or `ledger.actorID`. A ledger left without actors is removed.
    pub fn remove(&mut self, target: &str) {
        match target.split_once('.') {
            None => {
                self.0.remove(target);
            }
            Some((ledger, actor)) => {
                let now_empty = match self.0.get_mut(ledger) {
                    Some(Value::Object(actors)) => {
                        actors.remove(actor);
                        actors.is_empty()
                    }
                    _ => false,
                };
                if now_empty {
                    self.0.remove(ledger);
                }
            }
        }
    }
}

/// ACL applied to the system cocoon's ledgers: read-only
pub fn system_acl() -> AclMap {
    let mut map = AclMap::new();
    map.0.insert(
        "*".to_string(),
        Value::String("deny-create-ledger deny-put".to_string()),
    );
    map
}

/// Evaluates an [`AclMap`] against requests
#[derive(Debug, Clone)]
pub struct Interpreter<'a> {
    rules: &'a AclMap,
    default_policy: bool,
}

impl<'a> Interpreter<'a> {
    /// `default_policy` is the decision when no rule matches
    pub fn new(rules: &'a AclMap, default_policy: bool) -> Self {
        Interpreter {
            rules,
            default_policy,
        }
    }

    /// Every problem of the rules, one message each
    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        for (ledger, val) in &self.rules.0 {
            if ledger == "*" && !val.is_string() {
                errs.push(format!(
                    "{}: invalid wildcard ledger value type. Expects string value",
                    ledger
                ));
            }
            match val {
                Value::String(privileges) => {
                    for p in privileges.split(' ') {
                        if !is_valid_privilege(p) {
                            errs.push(format!(
                                "{}: ledger contains an invalid privilege ({})",
                                ledger, p
                            ));
                        }
                    }
                }
                Value::Object(actors) if actors.values().all(Value::is_string) => {
                    for (actor, privileges) in actors {
                        if actor.is_empty() {
                            errs.push(format!(
                                "{}: invalid actor id. cocoon or identity id cannot be an empty string",
                                ledger
                            ));
                        }
                        for p in privileges.as_str().unwrap_or_default().split(' ') {
                            if !is_valid_privilege(p) {
                                errs.push(format!(
                                    "{}: ledger actor contains an invalid privilege ({})",
                                    ledger, p
                                ));
                            }
                        }
                    }
                }
                _ => errs.push(format!(
                    "{}: invalid ledger value type. Expects string or map of strings",
                    ledger
                )),
            }
        }
        errs
    }

    /// First validation problem as an error
    pub fn check(&self) -> Result<(), CocoonError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(CocoonError::InvalidACL(format!("acl: {}", err))),
            None => Ok(()),
        }
    }

    fn apply(decision: &mut bool, privileges: &str, op: Operation) {
        for p in privileges.split(' ') {
            if let Some(d) = Privilege::from_str(p).ok().and_then(|p| p.decide(op)) {
                *decision = d;
            }
        }
    }

    /// Decision for `actor_id` performing `op` on `ledger`
    pub fn is_allowed(&self, ledger: &str, actor_id: &str, op: Operation) -> bool {
        let mut allowed = self.default_policy;
        if let Some(Value::String(privileges)) = self.rules.0.get("*") {
            Self::apply(&mut allowed, privileges, op);
        }
        match self.rules.0.get(ledger) {
            Some(Value::String(privileges)) => Self::apply(&mut allowed, privileges, op),
            Some(Value::Object(actors)) => {
                if let Some(Value::String(privileges)) = actors.get(actor_id) {
                    Self::apply(&mut allowed, privileges, op);
                }
            }
            _ => {}
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> AclMap {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn falls_back_to_default_policy() {
        let rules = AclMap::new();
        assert!(Interpreter::new(&rules, true).is_allowed("l", "a", Operation::Put));
        assert!(!Interpreter::new(&rules, false).is_allowed("l", "a", Operation::Put));
    }

    #[test]
    fn later_rules_override() {
        let rules = map(json!({
            "*": "deny",
            "ledger1": "allow-get",
            "ledger2": {"actor1": "allow-put deny-get"}
        }));
        let i = Interpreter::new(&rules, true);
        assert!(!i.is_allowed("other", "x", Operation::Get));
        assert!(i.is_allowed("ledger1", "x", Operation::RangeGet));
        assert!(!i.is_allowed("ledger1", "x", Operation::Put));
        assert!(i.is_allowed("ledger2", "actor1", Operation::Put));
        assert!(!i.is_allowed("ledger2", "actor1", Operation::GetById));
        assert!(!i.is_allowed("ledger2", "actor2", Operation::Put));
    }

    #[test]
    fn system_acl_is_read_only() {
        let rules = system_acl();
        let i = Interpreter::new(&rules, true);
        assert!(!i.is_allowed("public", "c1", Operation::Put));
        assert!(!i.is_allowed("public", "c1", Operation::CreateLedger));
        assert!(i.is_allowed("public", "c1", Operation::Get));
    }

    #[test]
    fn validation_messages() {
        let rules = map(json!({
            "*": {"a": "allow"},
            "l1": "allow bogus",
            "l2": {"": "allow", "b": "nope"},
            "l3": 5
        }));
        let errs = Interpreter::new(&rules, false).validate();
        assert!(errs.contains(&"*: invalid wildcard ledger value type. Expects string value".to_string()));
        assert!(errs.contains(&"l1: ledger contains an invalid privilege (bogus)".to_string()));
        assert!(errs.contains(
            &"l2: invalid actor id. cocoon or identity id cannot be an empty string".to_string()
        ));
        assert!(errs.contains(&"l2: ledger actor contains an invalid privilege (nope)".to_string()));
        assert!(errs.contains(
            &"l3: invalid ledger value type. Expects string or map of strings".to_string()
        ));
    }

    #[test]
    fn add_and_remove_targets() {
        let mut rules = AclMap::new();
        rules.add("l1", "allow").unwrap();
        rules.add("l1.actor", "deny").unwrap();
        assert_eq!(rules.0["l1"], json!({"actor": "deny"}));
        assert!(rules.add("a.b.c", "allow").is_err());
        rules.remove("l1.actor");
        assert!(rules.is_empty());
    }
}
