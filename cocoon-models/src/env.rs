// Copyright (c) 2023 The Cocoon Authors

//! Release environment variables and their `@flags`.
//!
//! A variable name may carry comma separated flags after `@`, for example
//! `DB_PASS@private,genRand32`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flag sending a variable to the private record
pub const FLAG_PRIVATE: &str = "private";

const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Environment variables of a cocoon release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Env(pub BTreeMap<String, String>);

/// Flags of a variable name
/// ```
/// # use cocoon_models::env::flags;
/// assert_eq!(flags("A@private, genRand16"), vec!["private", "genRand16"]);
/// assert!(flags("A").is_empty());
/// ```
pub fn flags(var: &str) -> Vec<String> {
    match var.split_once('@') {
        Some((_, f)) if !f.trim().is_empty() => {
            f.split(',').map(|flag| flag.trim().to_string()).collect()
        }
        _ => Vec::new(),
    }
}

/// Variable name without flags
pub fn var_name(var: &str) -> &str {
    var.split('@').next().unwrap_or(var)
}

/// Replaces `target` by `replacement` in the flags of `var`.
/// Returns the new name and whether the flag was found.
/// ```
/// # use cocoon_models::env::replace_flag;
/// assert_eq!(replace_flag("A@x,y", "y", "z"), ("A@x,z".to_string(), true));
/// assert_eq!(replace_flag("A", "y", "z"), ("A".to_string(), false));
/// ```
pub fn replace_flag(var: &str, target: &str, replacement: &str) -> (String, bool) {
    let mut var_flags = flags(var);
    let mut found = false;
    for f in var_flags.iter_mut() {
        if f == target {
            *f = replacement.to_string();
            found = true;
        }
    }
    if var_flags.is_empty() {
        return (var.to_string(), found);
    }
    (format!("{}@{}", var_name(var), var_flags.join(",")), found)
}

/// Random lowercase hex string of exactly `n` characters
pub fn random_hex(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

fn generated_length(flag: &str) -> Option<usize> {
    match flag {
        "genRand16" => Some(16),
        "genRand24" => Some(24),
        "genRand32" => Some(32),
        "genRand64" => Some(64),
        "genRand128" => Some(128),
        "genRand256" => Some(256),
        "genRand512" => Some(512),
        _ => None,
    }
}

impl Env {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites a variable
    pub fn set(&mut self, var: &str, value: &str) {
        self.0.insert(var.to_string(), value.to_string());
    }

    /// Whether a variable named `name` exists, whatever its flags
    pub fn has(&self, name: &str) -> bool {
        self.0.keys().any(|k| var_name(k) == name)
    }

    /// Value of the variable named `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| var_name(k) == name)
            .map(|(_, v)| v.as_str())
    }

    /// Full name (with flags) and value of the variable named like `var`
    pub fn get_full(&self, var: &str) -> Option<(&str, &str)> {
        let name = var_name(var);
        self.0
            .iter()
            .find(|(k, _)| var_name(k) == name)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variables carrying `flag`
    pub fn get_by_flag(&self, flag: &str) -> Env {
        Env(self
            .0
            .iter()
            .filter(|(k, _)| flags(k).iter().any(|f| f == flag))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Applies the flags and splits the variables into `(public, private)`.
    /// Flags are stripped from the names unless `keep_flags` is set.
    pub fn process(&self, keep_flags: bool) -> (Env, Env) {
        let mut public = Env::new();
        let mut private = Env::new();
        for (k, v) in &self.0 {
            let var_flags = flags(k);
            let mut value = v.clone();
            for f in &var_flags {
                if let Some(n) = generated_length(f) {
                    value = random_hex(n);
                }
            }
            let name = if keep_flags {
                k.clone()
            } else {
                var_name(k).to_string()
            };
            if var_flags.iter().any(|f| f == FLAG_PRIVATE) {
                private.0.insert(name, value);
            } else {
                public.0.insert(name, value);
            }
        }
        (public, private)
    }

    /// Like [`Env::process`], with both halves merged. Public values win on conflict.
    pub fn process_as_one(&self, keep_flags: bool) -> Env {
        let (mut public, private) = self.process(keep_flags);
        for (k, v) in private.0 {
            public.0.entry(k).or_insert(v);
        }
        public
    }

    /// Merges `other` in, overriding existing names
    pub fn merge(&mut self, other: &Env) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}
