// Copyright (c) 2023 The Cocoon Authors

//! Internal names, record keys and hashing helpers.

use sha2::{Digest, Sha256};

/// Id of the platform cocoon owning the system ledgers
pub const SYSTEM_COCOON_ID: &str = "system";
/// Name of the system ledger holding public records
pub const SYSTEM_PUBLIC_LEDGER: &str = "public";
/// Name of the system ledger holding secrets
pub const SYSTEM_PRIVATE_LEDGER: &str = "private";
/// Ledger names a cocoon may not create
pub const RESERVED_LEDGER_NAMES: [&str; 2] = [SYSTEM_PUBLIC_LEDGER, SYSTEM_PRIVATE_LEDGER];
/// Previous hash of a block on a chain without namespace
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const NAMESPACE_SEPARATOR: char = ';';

/// Lowercase hex SHA-256
/// ```
/// # use cocoon_models::naming::sha256_hex;
/// assert_eq!(
///     sha256_hex(b"abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(data.as_ref()))
}

/// Internal ledger name: `<cocoonID>;<name>`
pub fn make_ledger_name(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, name)
}

/// Internal transaction key: `<cocoonID>;<key>`
pub fn make_tx_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, key)
}

/// Splits an internal name into `(namespace, name)`. Names without namespace return `None`.
pub fn split_name(internal: &str) -> Option<(&str, &str)> {
    internal.split_once(NAMESPACE_SEPARATOR)
}

/// The key or ledger name as the cocoon sees it
/// ```
/// # use cocoon_models::naming::actual_name;
/// assert_eq!(actual_name("c1;account.ken"), "account.ken");
/// assert_eq!(actual_name("plain"), "plain");
/// ```
pub fn actual_name(internal: &str) -> &str {
    split_name(internal).map_or(internal, |(_, name)| name)
}

/// Reference hash of a chain, used as the previous hash of its first block.
/// `SHA256("<namespace>.<name>")`, or 64 zeros when the chain has no namespace.
pub fn genesis_hash(chain_name: &str) -> String {
    match split_name(chain_name) {
        Some((namespace, name)) => sha256_hex(format!("{}.{}", namespace, name)),
        None => ZERO_HASH.to_string(),
    }
}

/// Fresh uuid v4
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fresh block id, `sha256(uuid4)`
pub fn new_block_id() -> String {
    sha256_hex(new_uuid())
}

/// Public record key of an identity
pub fn make_identity_key(id: &str) -> String {
    format!("identity;{}", id)
}

/// Private record key of an identity (password, sessions)
pub fn make_identity_private_key(id: &str) -> String {
    format!("identity.private;{}", id)
}

/// Record key of a cocoon
pub fn make_cocoon_key(id: &str) -> String {
    format!("cocoon;{}", id)
}

/// Public record key of a release
pub fn make_release_key(id: &str) -> String {
    format!("release;{}", id)
}

/// Private record key of a release (private env)
pub fn make_release_private_key(id: &str) -> String {
    format!("release.private;{}", id)
}

/// Distributed lock key of a cocoon-scoped key
pub fn make_lock_key(cocoon_id: &str, key: &str) -> String {
    format!("platform/lock/{}.{}", cocoon_id, key)
}
