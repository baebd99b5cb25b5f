use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use smartslate_api::app::{self, services::AppServices};
use smartslate_auth::{AuthResolver, ResolverConfig, TokenVerifier, VerifierConfig};
use smartslate_infra::{
    InMemoryIdentityStore, InMemoryUserDirectory, IdentityStore, IdentitySync, RoleStore,
    directory::DirectoryUser,
};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryIdentityStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Spin the real router on an ephemeral port over in-memory storage.
    async fn spawn(owner_email: Option<&str>, with_directory: bool) -> Self {
        let store = Arc::new(InMemoryIdentityStore::new());
        let dyn_store: Arc<dyn IdentityStore> = store.clone();

        let roles = RoleStore::new(dyn_store.clone(), owner_email.map(str::to_string));
        roles.seed_roles().await.expect("failed to seed roles");

        let resolver = AuthResolver::new(
            TokenVerifier::new(VerifierConfig {
                shared_secret: Some(JWT_SECRET.to_string()),
                ..Default::default()
            }),
            ResolverConfig {
                owner_email: owner_email.map(str::to_string),
                allow_unverified: false,
            },
        );

        let sync = with_directory.then(|| {
            let directory = Arc::new(InMemoryUserDirectory::with_users(vec![DirectoryUser {
                id: "dir|seeded".to_string(),
                email: Some("seeded@smartslate.io".to_string()),
                display_name: Some("Seeded User".to_string()),
            }]));
            IdentitySync::new(dyn_store.clone(), directory)
        });

        let services = Arc::new(AppServices {
            resolver,
            roles,
            store: dyn_store,
            sync,
        });
        let router = app::build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: &str, email: Option<&str>, roles: &[&str]) -> String {
    mint_jwt_with_exp(sub, email, roles, Utc::now() + ChronoDuration::minutes(10))
}

fn mint_jwt_with_exp(
    sub: &str,
    email: Option<&str>,
    roles: &[&str],
    expires_at: chrono::DateTime<Utc>,
) -> String {
    let claims = json!({
        "sub": sub,
        "email": email,
        "roles": roles,
        "exp": expires_at.timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(None, false).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn whoami_requires_a_token() {
    let srv = TestServer::spawn(None, false).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn whoami_reflects_token_identity() {
    let srv = TestServer::spawn(None, false).await;
    let token = mint_jwt("auth0|alice", Some("alice@smartslate.io"), &["smartslateCourse"]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["subject"], "auth0|alice");
    assert_eq!(body["email"], "alice@smartslate.io");
    assert_eq!(body["verified"], true);
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "smartslateCourse"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "course:create"));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let srv = TestServer::spawn(None, false).await;
    let token = mint_jwt_with_exp(
        "auth0|alice",
        None,
        &["owner"],
        Utc::now() - ChronoDuration::hours(1),
    );

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_are_permission_gated() {
    let srv = TestServer::spawn(None, false).await;
    let client = reqwest::Client::new();
    let url = format!("{}/admin/roles", srv.base_url);

    // No token: 401.
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Learner holds no role:manage: 403, generic body.
    let learner = mint_jwt("auth0|learner", None, &["learner"]);
    let res = client.get(&url).bearer_auth(&learner).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
    assert!(!body["message"].as_str().unwrap().contains("role:manage"));

    // Admin: 200 and the seeded catalogue.
    let admin = mint_jwt("auth0|admin", None, &["admin"]);
    let res = client.get(&url).bearer_auth(&admin).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roles: serde_json::Value = res.json().await.unwrap();
    assert!(roles.as_array().unwrap().iter().any(|r| r["id"] == "learner"));
}

#[tokio::test]
async fn first_authenticated_request_provisions_the_user() {
    let srv = TestServer::spawn(None, false).await;
    let token = mint_jwt("auth0|alice", Some("Alice@Smartslate.io"), &[]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let user = srv
        .store
        .find_user_by_email("alice@smartslate.io")
        .await
        .unwrap()
        .expect("user row was not provisioned");
    assert_eq!(user.external_id.as_deref(), Some("auth0|alice"));
    assert_eq!(
        srv.store.roles_for_user(user.id).await.unwrap(),
        vec!["learner"]
    );
}

#[tokio::test]
async fn owner_email_override_grants_wildcard() {
    let srv = TestServer::spawn(Some("boss@smartslate.io"), false).await;
    // The token itself carries no elevated role.
    let token = mint_jwt("auth0|boss", Some("Boss@Smartslate.IO"), &["learner"]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "owner"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "*"));

    // And the override passes permission-gated routes.
    let res = client
        .get(format!("{}/admin/roles", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn role_assignment_round_trip() {
    let srv = TestServer::spawn(None, false).await;
    let admin = mint_jwt("auth0|admin", Some("admin@smartslate.io"), &["admin"]);
    let client = reqwest::Client::new();

    // Provision the target user via an authenticated request.
    let target = mint_jwt("auth0|bob", Some("bob@smartslate.io"), &[]);
    client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&target)
        .send()
        .await
        .unwrap();
    let bob = srv
        .store
        .find_user_by_email("bob@smartslate.io")
        .await
        .unwrap()
        .unwrap();

    // Assign a catalogue role.
    let res = client
        .post(format!("{}/admin/users/{}/roles", srv.base_url, bob.id))
        .bearer_auth(&admin)
        .json(&json!({ "role": "smartslateCourse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["assigned"], true);

    // An unknown role is rejected before touching the store.
    let res = client
        .post(format!("{}/admin/users/{}/roles", srv.base_url, bob.id))
        .bearer_auth(&admin)
        .json(&json!({ "role": "superuser" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/admin/users/{}/roles", srv.base_url, bob.id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let roles = body["roles"].as_array().unwrap();
    assert!(roles.iter().any(|r| r == "smartslateCourse"));

    // Revoke it again.
    let res = client
        .delete(format!(
            "{}/admin/users/{}/roles/smartslateCourse",
            srv.base_url, bob.id
        ))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["revoked"], true);
}

#[tokio::test]
async fn sync_endpoint_runs_and_is_idempotent() {
    let srv = TestServer::spawn(None, true).await;
    let owner = mint_jwt("auth0|owner", Some("owner@smartslate.io"), &["owner"]);
    let client = reqwest::Client::new();
    let url = format!("{}/admin/sync", srv.base_url);

    // First run imports the seeded directory user and exports the owner's
    // own freshly provisioned row.
    let res = client.post(&url).bearer_auth(&owner).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["local_created"], 1);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 0);

    let seeded = srv
        .store
        .find_user_by_email("seeded@smartslate.io")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seeded.external_id.as_deref(), Some("dir|seeded"));

    // Second run reconciles nothing.
    let res = client.post(&url).bearer_auth(&owner).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: serde_json::Value = res.json().await.unwrap();
    assert_eq!(summary["local_created"], 0);
    assert_eq!(summary["local_updated"], 0);
    assert_eq!(summary["directory_created"], 0);

    // The trigger needs database:manage.
    let learner = mint_jwt("auth0|learner", None, &["learner"]);
    let res = client.post(&url).bearer_auth(&learner).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sync_endpoint_without_directory_is_unavailable() {
    let srv = TestServer::spawn(None, false).await;
    let owner = mint_jwt("auth0|owner", None, &["owner"]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/admin/sync", srv.base_url))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
