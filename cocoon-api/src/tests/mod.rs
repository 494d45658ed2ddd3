// Copyright (c) 2023 The Cocoon Authors

use crate::{
    ApiConfig, ApiError, ApiGrpc, ApiService, Claims, DeploymentInfo, MockScheduler, TokenSigner,
};
use assert_matches::assert_matches;
use cocoon_models::cocoon::{identity_id, Cocoon, CocoonStatus};
use cocoon_models::CocoonError;
use cocoon_orderer_exports::OrdererConfig;
use cocoon_orderer_worker::Orderer;
use cocoon_platform::Platform;
use cocoon_proto::api::api_client::ApiClient;
use cocoon_proto::api::{CocoonPayloadRequest, CreateIdentityRequest, GetIdentityRequest, LoginRequest};
use cocoon_store_exports::{StoreConfig, StoreController};
use cocoon_store_worker::CocoonDB;
use std::time::Duration;
use tempfile::TempDir;
use tonic::metadata::MetadataMap;
use tonic::Code;

const PASSWORD: &str = "pw12345678";
const COMMIT: &str = "8b2f4c7e5d1a9f3b6c0e2d4a8f1b3c5e7d9a0b2c";

fn new_service(scheduler: MockScheduler) -> (ApiService, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = CocoonDB::new(StoreConfig::new(dir.path().to_path_buf())).unwrap();
    db.init().unwrap();
    let orderer = Orderer::new(Box::new(db.clone()), Box::new(db), OrdererConfig::default());
    let service = ApiService::new(
        Platform::new(Box::new(orderer)),
        Box::new(scheduler),
        TokenSigner::new("secret", Duration::from_secs(3600)),
    );
    (service, dir)
}

/// Creates an identity, logs it in and authenticates its token
async fn sign_up(service: &ApiService, email: &str) -> Claims {
    service.create_identity(email, PASSWORD).await.unwrap();
    let token = service.login(email, PASSWORD).await.unwrap();
    let mut metadata = MetadataMap::new();
    metadata.insert("access_token", token.parse().unwrap());
    service.authenticate(&metadata).unwrap()
}

fn payload(id: &str, num_signatories: u32, sig_threshold: u32) -> Vec<u8> {
    serde_json::to_vec(&Cocoon {
        id: id.into(),
        url: "https://github.com/ncodes/cocoon-example-01".into(),
        version: COMMIT.into(),
        language: "go".into(),
        memory: 512,
        cpu_share: 100,
        num_signatories,
        sig_threshold,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn identity_round_trip() {
    let (service, _dir) = new_service(MockScheduler::new());
    let id = service.create_identity("a@b.c", PASSWORD).await.unwrap();
    assert_eq!(id, identity_id("a@b.c"));

    let identity = service.get_identity("a@b.c", "").await.unwrap();
    assert_eq!(identity.email, "a@b.c");
    assert_ne!(identity.password, PASSWORD);
    assert!(!identity.password.is_empty());
    assert!(identity.client_sessions.is_empty());
    assert_eq!(service.get_identity("", &id).await.unwrap(), identity);

    assert_matches!(
        service.create_identity("a@b.c", PASSWORD).await,
        Err(ApiError::Cocoon(CocoonError::IdentityAlreadyExists))
    );
    assert_matches!(
        service.create_identity("short@b.c", "pw").await,
        Err(ApiError::Cocoon(CocoonError::InvalidArgument(_)))
    );
}

#[tokio::test]
async fn login_opens_a_session() {
    let (service, _dir) = new_service(MockScheduler::new());
    service.create_identity("a@b.c", PASSWORD).await.unwrap();

    let token = service.login("a@b.c", PASSWORD).await.unwrap();
    assert!(!token.is_empty());
    let identity = service.get_identity("a@b.c", "").await.unwrap();
    assert_eq!(identity.client_sessions.len(), 1);

    let err = service.login("a@b.c", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "email or password are invalid");
    assert_matches!(
        service.login("nobody@b.c", PASSWORD).await,
        Err(ApiError::InvalidCredentials)
    );

    let mut metadata = MetadataMap::new();
    assert_matches!(service.authenticate(&metadata), Err(ApiError::MissingToken));
    metadata.insert("authorization", "Bearer not-a-token".parse().unwrap());
    assert_matches!(
        service.authenticate(&metadata),
        Err(ApiError::Cocoon(CocoonError::InvalidOrExpiredToken))
    );
}

#[tokio::test]
async fn created_cocoons_belong_to_their_creator() {
    let (service, _dir) = new_service(MockScheduler::new());
    let owner = sign_up(&service, "a@b.c").await;

    let cocoon = service
        .create_cocoon(&owner, &payload("c1", 1, 1))
        .await
        .unwrap();
    assert_eq!(cocoon.identity_id, owner.identity);
    assert_eq!(cocoon.signatories, vec![owner.identity.clone()]);
    assert_eq!(cocoon.status, CocoonStatus::Created);
    assert_eq!(cocoon.releases.len(), 1);

    let release = service.get_release(&cocoon.releases[0]).await.unwrap();
    assert_eq!(release.cocoon_id, "c1");
    assert_eq!(release.version, COMMIT);
    let identity = service.get_identity("a@b.c", "").await.unwrap();
    assert_eq!(identity.cocoons, vec!["c1".to_string()]);

    assert_matches!(
        service.create_cocoon(&owner, &payload("c1", 1, 1)).await,
        Err(ApiError::Cocoon(CocoonError::CocoonExists))
    );

    let mut linked: Cocoon = serde_json::from_slice(&payload("c2", 1, 1)).unwrap();
    linked.link = "missing".into();
    let err = service
        .create_cocoon(&owner, &serde_json::to_vec(&linked).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot link to a non-existing cocoon");

    assert_matches!(
        service.create_cocoon(&owner, b"not json").await,
        Err(ApiError::MalformedPayload("cocoon", _))
    );
}

#[tokio::test]
async fn only_release_field_changes_create_releases() {
    let (service, _dir) = new_service(MockScheduler::new());
    let owner = sign_up(&service, "a@b.c").await;
    service
        .create_cocoon(&owner, &payload("c1", 1, 1))
        .await
        .unwrap();

    let outcome = service
        .update_cocoon(&owner, "c1", br#"{"memory": 1024}"#)
        .await
        .unwrap();
    assert!(outcome.cocoon_updated);
    assert!(outcome.new_release_id.is_empty());
    let cocoon = service.get_cocoon("c1").await.unwrap();
    assert_eq!(cocoon.memory, 1024);
    assert_eq!(cocoon.releases.len(), 1);

    let version = br#"{"version": "v1.0.1"}"#;
    let outcome = service.update_cocoon(&owner, "c1", version).await.unwrap();
    assert!(!outcome.new_release_id.is_empty());
    let cocoon = service.get_cocoon("c1").await.unwrap();
    assert_eq!(cocoon.releases.len(), 2);
    assert_eq!(cocoon.latest_release_id(), Some(outcome.new_release_id.as_str()));
    let release = service.get_release(&outcome.new_release_id).await.unwrap();
    assert_eq!(release.version, "v1.0.1");
    assert_eq!(release.sig_approved, 0);

    // the base release is the latest one while nothing was deployed
    let outcome = service.update_cocoon(&owner, "c1", version).await.unwrap();
    assert!(!outcome.cocoon_updated);
    assert!(outcome.new_release_id.is_empty());

    let stranger = sign_up(&service, "x@y.z").await;
    assert_matches!(
        service.update_cocoon(&stranger, "c1", version).await,
        Err(ApiError::NotOwner)
    );
}

#[tokio::test]
async fn signatories_vote_once_per_release() {
    let (service, _dir) = new_service(MockScheduler::new());
    let owner = sign_up(&service, "a@b.c").await;
    let signatory = sign_up(&service, "s@b.c").await;
    let stranger = sign_up(&service, "x@y.z").await;
    let cocoon = service
        .create_cocoon(&owner, &payload("c1", 2, 1))
        .await
        .unwrap();

    let outcome = service
        .add_signatories(&owner, "c1", &["s@b.c".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.added, vec![identity_id("s@b.c")]);
    assert!(outcome.errs.is_empty());

    let release_id = cocoon.releases[0].clone();
    let votes = service
        .add_vote(&signatory, &release_id, "1", "c1")
        .await
        .unwrap();
    assert_eq!(votes.sig_approved, 1);
    assert_eq!(service.get_release(&release_id).await.unwrap().sig_approved, 1);

    let err = service
        .add_vote(&signatory, &release_id, "1", "c1")
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("You have already cast a vote"));
    assert_matches!(
        service.add_vote(&stranger, &release_id, "0", "c1").await,
        Err(ApiError::NotSignatory)
    );
    assert_matches!(
        service.add_vote(&owner, &release_id, "yes", "c1").await,
        Err(ApiError::Rejected(_))
    );

    let err = service
        .add_signatories(&owner, "c1", &["x@y.z".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "max signatories already added. You can't add more");
}

#[tokio::test]
async fn signatory_additions_report_each_failure() {
    let (service, _dir) = new_service(MockScheduler::new());
    let owner = sign_up(&service, "a@b.c").await;
    service
        .create_cocoon(&owner, &payload("c1", 3, 1))
        .await
        .unwrap();

    let err = service
        .add_signatories(
            &owner,
            "c1",
            &["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "maximum required signatories cannot be exceeded. You can only add 2 more signatories"
    );

    let outcome = service
        .add_signatories(&owner, "c1", &["unknown".to_string(), owner.identity.clone()])
        .await
        .unwrap();
    assert!(outcome.added.is_empty());
    assert_eq!(
        outcome.errs,
        vec![
            "unknown: identity not found".to_string(),
            format!("{}: identity is already a signatory", owner.identity),
        ]
    );

    let removed = service
        .remove_signatories(&owner, "c1", &["a@b.c".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, vec![owner.identity.clone()]);
    assert!(service.get_cocoon("c1").await.unwrap().signatories.is_empty());
}

#[tokio::test]
async fn deploys_wait_for_approvals() {
    let mut scheduler = MockScheduler::new();
    scheduler
        .expect_deploy()
        .withf(|job| job.cocoon_id == "c1" && job.memory == 512 && job.disk_limit > 0)
        .times(1)
        .returning(|job| {
            Ok(DeploymentInfo {
                id: job.cocoon_id.clone(),
                eval_id: "e1".into(),
            })
        });
    scheduler.expect_stop().times(1).returning(|_| Ok(()));
    let (service, _dir) = new_service(scheduler);
    let owner = sign_up(&service, "a@b.c").await;
    let cocoon = service
        .create_cocoon(&owner, &payload("c1", 2, 1))
        .await
        .unwrap();

    let err = service.deploy(&owner, "c1").await.unwrap_err();
    assert_matches!(&err, ApiError::DeployDenied { approved: 0, threshold: 1 });
    assert_eq!(
        err.to_string(),
        "deployment denied. You currently have 0 approval vote(s) of the required 1 vote(s)"
    );

    service
        .add_vote(&owner, &cocoon.releases[0], "1", "c1")
        .await
        .unwrap();
    assert_eq!(service.deploy(&owner, "c1").await.unwrap(), "c1");
    let deployed = service.get_cocoon("c1").await.unwrap();
    assert_eq!(deployed.status, CocoonStatus::Started);
    assert_eq!(deployed.last_deployed_release_id, cocoon.releases[0]);

    let stranger = sign_up(&service, "x@y.z").await;
    assert_matches!(service.stop_cocoon(&stranger, "c1").await, Err(ApiError::NotOwner));
    service.stop_cocoon(&owner, "c1").await.unwrap();
    assert_eq!(
        service.get_cocoon("c1").await.unwrap().status,
        CocoonStatus::Stopped
    );
}

#[tokio::test]
async fn grpc_calls_carry_session_tokens() {
    let (service, _dir) = new_service(MockScheduler::new());
    let config = ApiConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        enable_health: false,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let handle = ApiGrpc::new(service).serve(&config).await.unwrap();
    let mut client = ApiClient::connect(format!("http://{}", handle.local_addr()))
        .await
        .unwrap();

    let resp = client
        .create_identity(CreateIdentityRequest {
            email: "a@b.c".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.status, 200);

    let resp = client
        .get_identity(GetIdentityRequest {
            email: "a@b.c".into(),
            id: String::new(),
        })
        .await
        .unwrap()
        .into_inner();
    let identity: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(identity["Email"], "a@b.c");
    assert_eq!(identity["ClientSessions"], serde_json::json!([]));

    let err = client
        .login(LoginRequest {
            email: "a@b.c".into(),
            password: "wrong".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(err.message(), "email or password are invalid");

    let token = client
        .login(LoginRequest {
            email: "a@b.c".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap()
        .into_inner()
        .body;
    let token = String::from_utf8(token).unwrap();
    assert!(!token.is_empty());

    let create = || CocoonPayloadRequest {
        id: "c1".into(),
        payload: payload("c1", 1, 1),
    };
    let err = client.create_cocoon(create()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let mut request = tonic::Request::new(create());
    request
        .metadata_mut()
        .insert("access_token", "bad".parse().unwrap());
    let err = client.create_cocoon(request).await.unwrap_err();
    assert_eq!(CocoonError::from(err), CocoonError::InvalidOrExpiredToken);

    let mut request = tonic::Request::new(create());
    request
        .metadata_mut()
        .insert("authorization", format!("Bearer {}", token).parse().unwrap());
    let resp = client.create_cocoon(request).await.unwrap().into_inner();
    assert_eq!(resp.status, 200);
    let cocoon: Cocoon = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(cocoon.identity_id, identity_id("a@b.c"));

    handle.stop();
}
