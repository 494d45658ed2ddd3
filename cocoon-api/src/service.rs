// Copyright (c) 2023 The Cocoon Authors

use crate::auth::{hash_password, request_token, verify_password, Claims, TokenSigner};
use crate::error::ApiError;
use crate::scheduler::{DeployJob, Scheduler};
use cocoon_models::cocoon::{identity_id, Cocoon, CocoonStatus, Identity, Release};
use cocoon_models::naming::{new_uuid, sha256_hex};
use cocoon_models::resources::ResourceSet;
use cocoon_models::validation::{validate_cocoon, validate_identity, validate_release};
use cocoon_models::CocoonError;
use cocoon_platform::{Platform, PlatformError};
use cocoon_time::CocoonTime;
use serde::Serialize;
use tonic::metadata::MetadataMap;
use tracing::{debug, info};

/// Outcome of a cocoon update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// id of the release created by the update, empty when no release field changed
    #[serde(rename = "newReleaseID")]
    pub new_release_id: String,
    /// whether the cocoon record was written
    #[serde(rename = "cocoonUpdated")]
    pub cocoon_updated: bool,
}

/// Outcome of a signatory addition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SignatoriesOutcome {
    /// identity ids added
    pub added: Vec<String>,
    /// per-id failures
    pub errs: Vec<String>,
}

/// Vote counts of a release after a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    /// approval votes
    pub sig_approved: u32,
    /// denial votes
    pub sig_denied: u32,
}

fn now() -> Result<String, ApiError> {
    CocoonTime::now()
        .and_then(|t| t.to_rfc3339())
        .map_err(|e| ApiError::TimeError(e.to_string()))
}

fn is_not_found(err: &PlatformError, kind: &CocoonError) -> bool {
    matches!(err, PlatformError::Cocoon(e) if e == kind)
}

/// Identity id of an id or an email
fn to_identity_id(id_or_email: &str) -> String {
    if id_or_email.contains('@') {
        identity_id(id_or_email)
    } else {
        id_or_email.to_string()
    }
}

/// Platform operations on behalf of authenticated identities
#[derive(Clone)]
pub struct ApiService {
    platform: Platform,
    scheduler: Box<dyn Scheduler>,
    signer: TokenSigner,
}

impl ApiService {
    /// Service writing records through `platform` and deploying with `scheduler`
    pub fn new(platform: Platform, scheduler: Box<dyn Scheduler>, signer: TokenSigner) -> Self {
        ApiService {
            platform,
            scheduler,
            signer,
        }
    }

    /// Claims of the token carried by a request
    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<Claims, ApiError> {
        let token = request_token(metadata).ok_or(ApiError::MissingToken)?;
        self.signer.verify(&token)
    }

    /// Creates an identity, returning its id
    pub async fn create_identity(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let mut identity = Identity::new(email, password);
        identity.created_at = now()?;
        validate_identity(&identity)?;
        let id = identity.id();
        match self.platform.get_identity(&id).await {
            Ok(_) | Err(PlatformError::MissingIdentityPrivateData) => {
                return Err(CocoonError::IdentityAlreadyExists.into())
            }
            Err(err) if is_not_found(&err, &CocoonError::IdentityNotFound) => {}
            Err(err) => return Err(err.into()),
        }
        identity.password = hash_password(password)?;
        self.platform.put_identity(&identity).await?;
        info!("identity {} created", id);
        Ok(id)
    }

    /// Identity by email, or by id when no email is given
    pub async fn get_identity(&self, email: &str, id: &str) -> Result<Identity, ApiError> {
        let id = if !email.is_empty() {
            identity_id(email)
        } else if !id.is_empty() {
            id.to_string()
        } else {
            return Err(ApiError::Rejected("email or id is required".into()));
        };
        Ok(self.platform.get_identity(&id).await?)
    }

    /// Opens a session, returning its token
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let mut identity = match self.platform.get_identity(&identity_id(email)).await {
            Ok(identity) => identity,
            Err(err) if is_not_found(&err, &CocoonError::IdentityNotFound) => {
                return Err(ApiError::InvalidCredentials)
            }
            Err(err) => return Err(err.into()),
        };
        if !verify_password(password, &identity.password) {
            return Err(ApiError::InvalidCredentials);
        }
        let session_id = sha256_hex(new_uuid());
        identity.client_sessions.push(session_id.clone());
        self.platform.put_identity(&identity).await?;
        self.signer.sign(&session_id, &identity.id())
    }

    async fn owned_cocoon(&self, claims: &Claims, cocoon_id: &str) -> Result<Cocoon, ApiError> {
        let cocoon = self.platform.get_cocoon(cocoon_id).await?;
        if cocoon.identity_id != claims.identity {
            return Err(ApiError::NotOwner);
        }
        Ok(cocoon)
    }

    async fn check_link(&self, cocoon_id: &str, link: &str) -> Result<(), ApiError> {
        if link.is_empty() || link == cocoon_id {
            return Ok(());
        }
        match self.platform.get_cocoon(link).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err, &CocoonError::CocoonNotFound) => Err(ApiError::Rejected(
                "cannot link to a non-existing cocoon".into(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Creates a cocoon owned by the caller along with its first release
    pub async fn create_cocoon(&self, claims: &Claims, payload: &[u8]) -> Result<Cocoon, ApiError> {
        let mut cocoon: Cocoon = serde_json::from_slice(payload)
            .map_err(|e| ApiError::MalformedPayload("cocoon", e.to_string()))?;
        let created_at = now()?;
        let release_id = new_uuid();
        cocoon.status = CocoonStatus::Created;
        cocoon.identity_id = claims.identity.clone();
        cocoon.releases = vec![release_id.clone()];
        cocoon.last_deployed_release_id = String::new();
        cocoon.created_at = created_at.clone();
        if !cocoon.is_signatory(&claims.identity) {
            cocoon.signatories.push(claims.identity.clone());
        }
        cocoon.firewall = cocoon.firewall.dedup();
        validate_cocoon(&cocoon)?;

        match self.platform.get_cocoon(&cocoon.id).await {
            Ok(_) => return Err(CocoonError::CocoonExists.into()),
            Err(err) if is_not_found(&err, &CocoonError::CocoonNotFound) => {}
            Err(err) => return Err(err.into()),
        }
        self.check_link(&cocoon.id, &cocoon.link).await?;

        let release = cocoon.to_release(&release_id, &created_at);
        validate_release(&release)?;
        let mut identity = self.platform.get_identity(&claims.identity).await?;

        self.platform.put_cocoon(&cocoon).await?;
        self.platform.put_release(&release).await?;
        identity.cocoons.push(cocoon.id.clone());
        self.platform.put_identity(&identity).await?;
        info!("cocoon {} created with release {}", cocoon.id, release_id);
        Ok(cocoon)
    }

    /// Updates the resources and signatory numbers of a cocoon in place and
    /// creates a release when a release field changes
    pub async fn update_cocoon(
        &self,
        claims: &Claims,
        cocoon_id: &str,
        payload: &[u8],
    ) -> Result<UpdateOutcome, ApiError> {
        let upd: Cocoon = serde_json::from_slice(payload)
            .map_err(|e| ApiError::MalformedPayload("cocoon", e.to_string()))?;
        let mut cocoon = self.owned_cocoon(claims, cocoon_id).await?;
        let mut outcome = UpdateOutcome {
            new_release_id: String::new(),
            cocoon_updated: false,
        };

        if upd.memory != 0 && upd.memory != cocoon.memory {
            cocoon.memory = upd.memory;
            outcome.cocoon_updated = true;
        }
        if upd.cpu_share != 0 && upd.cpu_share != cocoon.cpu_share {
            cocoon.cpu_share = upd.cpu_share;
            outcome.cocoon_updated = true;
        }
        if upd.num_signatories != 0 && upd.num_signatories != cocoon.num_signatories {
            cocoon.num_signatories = upd.num_signatories;
            outcome.cocoon_updated = true;
        }
        if upd.sig_threshold != 0 && upd.sig_threshold != cocoon.sig_threshold {
            cocoon.sig_threshold = upd.sig_threshold;
            outcome.cocoon_updated = true;
        }

        let (_, base) = self
            .platform
            .get_cocoon_and_last_active_release(cocoon_id, true)
            .await?;
        let mut release = base.clone();
        if !upd.url.is_empty() {
            release.url = upd.url;
        }
        if !upd.version.is_empty() {
            release.version = upd.version;
        }
        if !upd.language.is_empty() {
            release.language = upd.language;
        }
        if !upd.build_param.is_empty() {
            release.build_param = upd.build_param;
        }
        if !upd.link.is_empty() {
            self.check_link(cocoon_id, &upd.link).await?;
            release.link = upd.link;
        }
        if !upd.firewall.is_empty() {
            release.firewall = upd.firewall.dedup();
        }
        if !upd.acl.is_empty() {
            release.acl = upd.acl;
        }
        if !upd.env.0.is_empty() {
            release.env = upd.env;
        }

        if release.deploy_fields_differ(&base) {
            let created_at = now()?;
            release = Release {
                id: new_uuid(),
                cocoon_id: cocoon.id.clone(),
                sig_approved: 0,
                sig_denied: 0,
                voters_id: Vec::new(),
                created_at,
                ..release
            };
            cocoon.url = release.url.clone();
            cocoon.version = release.version.clone();
            cocoon.language = release.language.clone();
            cocoon.build_param = release.build_param.clone();
            cocoon.link = release.link.clone();
            cocoon.firewall = release.firewall.clone();
            cocoon.acl = release.acl.clone();
            cocoon.releases.push(release.id.clone());
            validate_release(&release)?;
            outcome.new_release_id = release.id.clone();
            outcome.cocoon_updated = true;
        }

        if outcome.cocoon_updated {
            validate_cocoon(&cocoon)?;
            if !outcome.new_release_id.is_empty() {
                self.platform.put_release(&release).await?;
            }
            self.platform.put_cocoon(&cocoon).await?;
        }
        debug!("cocoon {} update: {:?}", cocoon_id, outcome);
        Ok(outcome)
    }

    /// Reads a cocoon
    pub async fn get_cocoon(&self, id: &str) -> Result<Cocoon, ApiError> {
        Ok(self.platform.get_cocoon(id).await?)
    }

    /// Reads the public part of a release
    pub async fn get_release(&self, id: &str) -> Result<Release, ApiError> {
        Ok(self.platform.get_release(id, false).await?)
    }

    /// Adds signatories, by identity id or email, to a cocoon of the caller
    pub async fn add_signatories(
        &self,
        claims: &Claims,
        cocoon_id: &str,
        ids: &[String],
    ) -> Result<SignatoriesOutcome, ApiError> {
        let mut cocoon = self.owned_cocoon(claims, cocoon_id).await?;
        let slots = (cocoon.num_signatories as usize).saturating_sub(cocoon.signatories.len());
        if slots == 0 {
            return Err(ApiError::Rejected(
                "max signatories already added. You can't add more".into(),
            ));
        }
        if ids.len() > slots {
            let noun = if slots == 1 { "signatory" } else { "signatories" };
            return Err(ApiError::Rejected(format!(
                "maximum required signatories cannot be exceeded. You can only add {} more {}",
                slots, noun
            )));
        }

        let mut outcome = SignatoriesOutcome::default();
        for id in ids {
            let id = to_identity_id(id);
            match self.platform.get_identity(&id).await {
                Ok(_) => {}
                Err(err) if is_not_found(&err, &CocoonError::IdentityNotFound) => {
                    outcome.errs.push(format!("{}: identity not found", id));
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
            if cocoon.is_signatory(&id) {
                outcome
                    .errs
                    .push(format!("{}: identity is already a signatory", id));
                continue;
            }
            cocoon.signatories.push(id.clone());
            outcome.added.push(id);
        }
        if !outcome.added.is_empty() {
            self.platform.put_cocoon(&cocoon).await?;
        }
        Ok(outcome)
    }

    /// Removes signatories from a cocoon of the caller, returning the removed ids
    pub async fn remove_signatories(
        &self,
        claims: &Claims,
        cocoon_id: &str,
        ids: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let mut cocoon = self.owned_cocoon(claims, cocoon_id).await?;
        let targets: Vec<String> = ids.iter().map(|id| to_identity_id(id)).collect();
        let (removed, kept): (Vec<String>, Vec<String>) = cocoon
            .signatories
            .into_iter()
            .partition(|s| targets.contains(s));
        cocoon.signatories = kept;
        if !removed.is_empty() {
            self.platform.put_cocoon(&cocoon).await?;
        }
        Ok(removed)
    }

    /// Records the caller's vote, `"1"` approves and `"0"` denies
    pub async fn add_vote(
        &self,
        claims: &Claims,
        release_id: &str,
        vote: &str,
        cocoon_id: &str,
    ) -> Result<VoteOutcome, ApiError> {
        let approve = match vote {
            "1" => true,
            "0" => false,
            _ => return Err(ApiError::Rejected("vote must be 1 or 0".into())),
        };
        let mut release = self.platform.get_release(release_id, true).await?;
        if !cocoon_id.is_empty() && cocoon_id != release.cocoon_id {
            return Err(CocoonError::ReleaseNotFound.into());
        }
        let cocoon = self.platform.get_cocoon(&release.cocoon_id).await?;
        if !cocoon.is_signatory(&claims.identity) {
            return Err(ApiError::NotSignatory);
        }
        if release.has_voted(&claims.identity) {
            return Err(ApiError::AlreadyVoted);
        }
        if approve {
            release.sig_approved += 1;
        } else {
            release.sig_denied += 1;
        }
        release.voters_id.push(claims.identity.clone());
        self.platform.put_release(&release).await?;
        Ok(VoteOutcome {
            sig_approved: release.sig_approved,
            sig_denied: release.sig_denied,
        })
    }

    /// Asks the scheduler to run the latest release of a cocoon of the
    /// caller, returning the job id
    pub async fn deploy(&self, claims: &Claims, cocoon_id: &str) -> Result<String, ApiError> {
        let mut cocoon = self.owned_cocoon(claims, cocoon_id).await?;
        let release_id = cocoon
            .latest_release_id()
            .ok_or(PlatformError::NoRelease)?
            .to_string();
        let release = self.platform.get_release(&release_id, false).await?;
        if cocoon.num_signatories > 1 && release.sig_approved < cocoon.sig_threshold {
            return Err(ApiError::DeployDenied {
                approved: release.sig_approved,
                threshold: cocoon.sig_threshold,
            });
        }
        let resources = ResourceSet::find(cocoon.memory, cocoon.cpu_share).ok_or_else(|| {
            CocoonError::InvalidArgument("Unknown resource set".into())
        })?;
        let job = DeployJob {
            cocoon_id: cocoon.id.clone(),
            release_id: release.id.clone(),
            link: release.link.clone(),
            memory: cocoon.memory,
            cpu_share: cocoon.cpu_share,
            disk_limit: resources.disk_bytes(),
        };
        let info = self.scheduler.deploy(&job).await?;
        cocoon.status = CocoonStatus::Started;
        cocoon.last_deployed_release_id = release.id;
        self.platform.put_cocoon(&cocoon).await?;
        info!("cocoon {} deployed as job {} ({})", cocoon.id, info.id, info.eval_id);
        Ok(info.id)
    }

    /// Stops the job of a cocoon of the caller
    pub async fn stop_cocoon(&self, claims: &Claims, cocoon_id: &str) -> Result<(), ApiError> {
        let mut cocoon = self.owned_cocoon(claims, cocoon_id).await?;
        self.scheduler.stop(&cocoon.id).await?;
        cocoon.status = CocoonStatus::Stopped;
        self.platform.put_cocoon(&cocoon).await?;
        info!("cocoon {} stopped", cocoon.id);
        Ok(())
    }
}
