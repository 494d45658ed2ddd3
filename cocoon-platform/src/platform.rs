// Copyright (c) 2023 The Cocoon Authors

use crate::error::PlatformError;
use cocoon_models::cocoon::{Cocoon, Identity, Release};
use cocoon_models::env::Env;
use cocoon_models::ledger::Transaction;
use cocoon_models::naming::{
    make_cocoon_key, make_identity_key, make_identity_private_key, make_release_key,
    make_release_private_key, new_uuid, SYSTEM_COCOON_ID, SYSTEM_PRIVATE_LEDGER,
    SYSTEM_PUBLIC_LEDGER,
};
use cocoon_models::CocoonError;
use cocoon_orderer_exports::OrdererController;
use cocoon_time::CocoonTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Reads and writes platform records
#[derive(Clone)]
pub struct Platform {
    orderer: Box<dyn OrdererController>,
}

/// Unix seconds of an RFC 3339 timestamp, now when empty or malformed
fn unix_secs(rfc3339: &str) -> i64 {
    CocoonTime::from_rfc3339(rfc3339)
        .or_else(|_| CocoonTime::now())
        .map(|t| t.to_unix_secs())
        .unwrap_or_default()
}

fn decode<T: DeserializeOwned>(kind: &'static str, tx: &Transaction) -> Result<T, PlatformError> {
    serde_json::from_str(&tx.value).map_err(|e| PlatformError::MalformedRecord(kind, e.to_string()))
}

fn encode<T: Serialize>(kind: &'static str, value: &T) -> Result<String, PlatformError> {
    serde_json::to_string(value).map_err(|e| PlatformError::MalformedRecord(kind, e.to_string()))
}

impl Platform {
    /// Platform over `orderer`
    pub fn new(orderer: Box<dyn OrdererController>) -> Self {
        Platform { orderer }
    }

    /// The orderer records go through
    pub fn orderer(&self) -> &dyn OrdererController {
        self.orderer.as_ref()
    }

    async fn put_system(&self, ledger: &str, key: String, value: String, created_at: &str) -> Result<(), PlatformError> {
        let tx = Transaction {
            id: new_uuid(),
            key,
            value,
            created_at: unix_secs(created_at),
            ..Default::default()
        };
        let res = self.orderer.put(SYSTEM_COCOON_ID, ledger, vec![tx]).await?;
        if let Some(receipt) = res.tx_receipts.iter().find(|r| !r.err.is_empty()) {
            return Err(CocoonError::Internal(receipt.err.clone()).into());
        }
        Ok(())
    }

    /// Latest version of a system record, `None` when absent
    async fn get_system(&self, ledger: &str, key: &str) -> Result<Option<Transaction>, PlatformError> {
        match self.orderer.get(SYSTEM_COCOON_ID, ledger, key).await {
            Ok(tx) => Ok(Some(tx)),
            Err(CocoonError::TxNotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Stores an identity. Password and client sessions go to the private ledger.
    pub async fn put_identity(&self, identity: &Identity) -> Result<(), PlatformError> {
        let id = identity.id();
        let public = Identity {
            password: String::new(),
            client_sessions: Vec::new(),
            ..identity.clone()
        };
        let private = Identity {
            password: identity.password.clone(),
            client_sessions: identity.client_sessions.clone(),
            ..Default::default()
        };
        self.put_system(
            SYSTEM_PUBLIC_LEDGER,
            make_identity_key(&id),
            encode("identity", &public)?,
            &identity.created_at,
        )
        .await?;
        self.put_system(
            SYSTEM_PRIVATE_LEDGER,
            make_identity_private_key(&id),
            encode("identity", &private)?,
            &identity.created_at,
        )
        .await
    }

    /// Reads an identity with its private fields
    pub async fn get_identity(&self, id: &str) -> Result<Identity, PlatformError> {
        let tx = self
            .get_system(SYSTEM_PUBLIC_LEDGER, &make_identity_key(id))
            .await?
            .ok_or(CocoonError::IdentityNotFound)?;
        let private_tx = self
            .get_system(SYSTEM_PRIVATE_LEDGER, &make_identity_private_key(id))
            .await?
            .ok_or(PlatformError::MissingIdentityPrivateData)?;
        let mut identity: Identity = decode("identity", &tx)?;
        let private: Identity = decode("identity", &private_tx)?;
        identity.password = private.password;
        identity.client_sessions = private.client_sessions;
        Ok(identity)
    }

    /// Stores a cocoon
    pub async fn put_cocoon(&self, cocoon: &Cocoon) -> Result<(), PlatformError> {
        self.put_system(
            SYSTEM_PUBLIC_LEDGER,
            make_cocoon_key(&cocoon.id),
            encode("cocoon", cocoon)?,
            &cocoon.created_at,
        )
        .await
    }

    /// Reads a cocoon
    pub async fn get_cocoon(&self, id: &str) -> Result<Cocoon, PlatformError> {
        let tx = self
            .get_system(SYSTEM_PUBLIC_LEDGER, &make_cocoon_key(id))
            .await?
            .ok_or(CocoonError::CocoonNotFound)?;
        decode("cocoon", &tx)
    }

    /// Stores a release. `@private` variables go to the private ledger.
    pub async fn put_release(&self, release: &Release) -> Result<(), PlatformError> {
        let (public_env, private_env) = release.env.process(true);
        let public = Release {
            env: public_env,
            ..release.clone()
        };
        let private = Release {
            env: private_env,
            ..Default::default()
        };
        self.put_system(
            SYSTEM_PUBLIC_LEDGER,
            make_release_key(&release.id),
            encode("release", &public)?,
            &release.created_at,
        )
        .await?;
        self.put_system(
            SYSTEM_PRIVATE_LEDGER,
            make_release_private_key(&release.id),
            encode("release", &private)?,
            &release.created_at,
        )
        .await
    }

    /// Reads a release. With `include_private`, private variables are merged
    /// into its env.
    pub async fn get_release(&self, id: &str, include_private: bool) -> Result<Release, PlatformError> {
        let tx = self
            .get_system(SYSTEM_PUBLIC_LEDGER, &make_release_key(id))
            .await?
            .ok_or(CocoonError::ReleaseNotFound)?;
        let mut release: Release = decode("release", &tx)?;
        if include_private {
            if let Some(private_tx) = self
                .get_system(SYSTEM_PRIVATE_LEDGER, &make_release_private_key(id))
                .await?
            {
                let private: Release = decode("release", &private_tx)?;
                let mut env: Env = release.env.clone();
                env.merge(&private.env);
                release.env = env;
            } else {
                debug!("release {} has no private record", id);
            }
        }
        Ok(release)
    }

    /// Reads a cocoon and one of its releases
    pub async fn get_cocoon_and_release(
        &self,
        cocoon_id: &str,
        release_id: &str,
        include_private: bool,
    ) -> Result<(Cocoon, Release), PlatformError> {
        let cocoon = self.get_cocoon(cocoon_id).await?;
        let release = self.get_release(release_id, include_private).await?;
        Ok((cocoon, release))
    }

    /// Reads a cocoon with its last deployed release, or its latest release
    /// if it was never deployed
    pub async fn get_cocoon_and_last_active_release(
        &self,
        cocoon_id: &str,
        include_private: bool,
    ) -> Result<(Cocoon, Release), PlatformError> {
        let cocoon = self.get_cocoon(cocoon_id).await?;
        let release_id = if cocoon.last_deployed_release_id.is_empty() {
            cocoon
                .latest_release_id()
                .ok_or(PlatformError::NoRelease)?
                .to_string()
        } else {
            cocoon.last_deployed_release_id.clone()
        };
        let release = self.get_release(&release_id, include_private).await?;
        Ok((cocoon, release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cocoon_orderer_exports::OrdererConfig;
    use cocoon_orderer_worker::Orderer;
    use cocoon_store_exports::{StoreConfig, StoreController};
    use cocoon_store_worker::CocoonDB;
    use tempfile::TempDir;

    fn new_platform() -> (Platform, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
        db.init().unwrap();
        let orderer = Orderer::new(Box::new(db.clone()), Box::new(db), OrdererConfig::default());
        (Platform::new(Box::new(orderer)), dir)
    }

    #[tokio::test]
    async fn identity_secrets_stay_private() {
        let (platform, _dir) = new_platform();
        let mut identity = Identity::new("Ken@Example.com", "hashed");
        identity.client_sessions = vec!["s1".into()];
        platform.put_identity(&identity).await.unwrap();

        let public = platform
            .orderer()
            .get(SYSTEM_COCOON_ID, SYSTEM_PUBLIC_LEDGER, &make_identity_key(&identity.id()))
            .await
            .unwrap();
        assert!(!public.value.contains("hashed"));
        assert!(!public.value.contains("s1"));

        let got = platform.get_identity(&identity.id()).await.unwrap();
        assert_eq!(got.password, "hashed");
        assert_eq!(got.client_sessions, vec!["s1".to_string()]);
        assert_eq!(got.email, "Ken@Example.com");

        assert_matches!(
            platform.get_identity("unknown").await,
            Err(PlatformError::Cocoon(CocoonError::IdentityNotFound))
        );
    }

    #[tokio::test]
    async fn release_private_env_is_merged_back() {
        let (platform, _dir) = new_platform();
        let mut env = Env::new();
        env.set("HOST", "example.com");
        env.set("SECRET@private", "s3cr3t");
        let release = Release {
            id: "r1".into(),
            cocoon_id: "c1".into(),
            env,
            ..Default::default()
        };
        platform.put_release(&release).await.unwrap();

        let public = platform.get_release("r1", false).await.unwrap();
        assert!(public.env.has("HOST"));
        assert!(!public.env.has("SECRET"));

        let full = platform.get_release("r1", true).await.unwrap();
        assert_eq!(full.env.get("SECRET"), Some("s3cr3t"));
        assert_eq!(full.env.get("HOST"), Some("example.com"));

        assert_matches!(
            platform.get_release("nope", true).await,
            Err(PlatformError::Cocoon(CocoonError::ReleaseNotFound))
        );
    }

    #[tokio::test]
    async fn last_active_release() {
        let (platform, _dir) = new_platform();
        let mut cocoon = Cocoon {
            id: "c1".into(),
            ..Default::default()
        };
        platform.put_cocoon(&cocoon).await.unwrap();
        assert_eq!(
            platform.get_cocoon_and_last_active_release("c1", false).await.unwrap_err(),
            PlatformError::NoRelease
        );

        for id in ["r1", "r2"] {
            platform.put_release(&cocoon.to_release(id, "")).await.unwrap();
            cocoon.releases.push(id.into());
        }
        platform.put_cocoon(&cocoon).await.unwrap();
        let (_, release) = platform.get_cocoon_and_last_active_release("c1", false).await.unwrap();
        assert_eq!(release.id, "r2");

        cocoon.last_deployed_release_id = "r1".into();
        platform.put_cocoon(&cocoon).await.unwrap();
        let (got, release) = platform.get_cocoon_and_last_active_release("c1", false).await.unwrap();
        assert_eq!(release.id, "r1");
        assert_eq!(got, cocoon);

        assert_matches!(
            platform.get_cocoon("c2").await,
            Err(PlatformError::Cocoon(CocoonError::CocoonNotFound))
        );
    }
}
