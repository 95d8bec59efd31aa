//! Callable surface tests
//!
//! Drives `routes::dispatch` with real bearer tokens over in-memory backends
//! and checks the status codes and JSON envelopes the front-ends rely on.

use async_trait::async_trait;
use clap::Parser;
use hyper::StatusCode;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use civic_watch::auth::{CallerRole, JwtValidator, TokenInput};
use civic_watch::config::Args;
use civic_watch::geo;
use civic_watch::identity::{IdentityProvider, MemoryIdentityProvider};
use civic_watch::model::{AuthorityEntry, AuthorityProfile, Issue, ReporterProfile, Zone};
use civic_watch::routes::dispatch;
use civic_watch::server::AppState;
use civic_watch::services::{CodeDelivery, OutgoingMail};
use civic_watch::store::{IssueRepository, MemoryStore, ProfileRepository};
use civic_watch::CivicError;

const SECRET: &str = "callable-test-secret-at-least-32-characters";

#[derive(Default)]
struct Outbox(Mutex<Vec<OutgoingMail>>);

#[async_trait]
impl CodeDelivery for Outbox {
    async fn deliver(&self, mail: OutgoingMail) -> civic_watch::Result<()> {
        self.0.lock().unwrap().push(mail);
        Ok(())
    }
}

struct Harness {
    state: AppState,
    store: Arc<MemoryStore>,
    identities: Arc<MemoryIdentityProvider>,
    outbox: Arc<Outbox>,
    jwt: JwtValidator,
}

impl Harness {
    async fn new() -> Self {
        let args = Args::parse_from(["civic-watch", "--dev-mode"]);
        let store = Arc::new(MemoryStore::default());
        let identities = Arc::new(MemoryIdentityProvider::new());
        let outbox = Arc::new(Outbox::default());
        let jwt = JwtValidator::new(SECRET.into(), 3600).unwrap();

        store
            .insert_issue(Issue::submitted("north-1", "Pothole", zone("BLRN"), "citizen-1"))
            .await
            .unwrap();
        store
            .insert_issue(Issue::submitted("south-1", "Garbage", zone("BLRS"), "citizen-1"))
            .await
            .unwrap();
        store
            .seed_reporter(
                "citizen-1",
                ReporterProfile {
                    name: "Ravi".into(),
                    email: "ravi@example.com".into(),
                    phone: None,
                    address: Some("12 MG Road".into()),
                },
            )
            .await;

        let state = AppState::new(
            args,
            store.clone(),
            identities.clone(),
            outbox.clone(),
            jwt.clone(),
        );

        Self {
            state,
            store,
            identities,
            outbox,
            jwt,
        }
    }

    fn token(&self, uid: &str, role: Option<CallerRole>) -> String {
        let token = self
            .jwt
            .generate_token(TokenInput {
                uid: uid.into(),
                email: None,
                role,
            })
            .unwrap();
        format!("Bearer {}", token)
    }

    fn authority(&self, code: &str) -> String {
        self.token(
            &format!("auth-{}", code),
            Some(CallerRole::Authority { zone: zone(code) }),
        )
    }

    fn superadmin(&self) -> String {
        self.token("root", Some(CallerRole::SuperAdmin))
    }

    async fn call(&self, procedure: &str, auth: Option<&str>, data: Value) -> (StatusCode, Value) {
        let body = json!({ "data": data }).to_string();
        dispatch(&self.state, procedure, auth, body.as_bytes()).await
    }
}

fn zone(code: &str) -> Zone {
    Zone::parse(code).unwrap()
}

fn error_status(body: &Value) -> &str {
    body["error"]["status"].as_str().unwrap_or_default()
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let h = Harness::new().await;
    let (status, body) = h.call("rejectIssue", None, json!({ "issueId": "north-1" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_status(&body), "UNAUTHENTICATED");
    assert!(h.store.get_issue("north-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_roleless_token_is_unauthenticated() {
    let h = Harness::new().await;
    let citizen = h.token("citizen-1", None);
    let (status, body) = h
        .call("getUserDetails", Some(&citizen), json!({ "userId": "citizen-1" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_status(&body), "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_forged_token_is_unauthenticated() {
    let h = Harness::new().await;
    let forged = JwtValidator::new("some-other-secret-that-is-32-chars-long!".into(), 3600)
        .unwrap()
        .generate_token(TokenInput {
            uid: "root".into(),
            email: None,
            role: Some(CallerRole::SuperAdmin),
        })
        .unwrap();
    let (status, _) = h
        .call("rejectIssue", Some(&format!("Bearer {}", forged)), json!({ "issueId": "north-1" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Issue procedures
// =============================================================================

#[tokio::test]
async fn test_resolve_in_zone() {
    let h = Harness::new().await;
    let (status, body) = h
        .call(
            "resolveIssue",
            Some(&h.authority("BLRN")),
            json!({ "issueId": "north-1", "resolutionDetails": "Road patched" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["result"], "Issue north-1 resolved.");
    assert_eq!(body["result"]["archived"]["resolvedBy"], "auth-BLRN");
    assert_eq!(body["result"]["archived"]["resolutionDetails"], "Road patched");
    assert_eq!(body["result"]["archived"]["status"], "Resolved");

    let (status, body) = h
        .call("resolveIssue", Some(&h.authority("BLRN")), json!({ "issueId": "north-1" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_status(&body), "NOT_FOUND");
}

#[tokio::test]
async fn test_cross_zone_denied() {
    let h = Harness::new().await;
    let north = h.authority("BLRN");

    for (procedure, data) in [
        ("resolveIssue", json!({ "issueId": "south-1" })),
        ("setIssueStatus", json!({ "issueId": "south-1", "status": "Approved" })),
        ("rejectIssue", json!({ "issueId": "south-1" })),
    ] {
        let (status, body) = h.call(procedure, Some(&north), data).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", procedure);
        assert_eq!(error_status(&body), "PERMISSION_DENIED");
    }

    let south = h.store.get_issue("south-1").await.unwrap().unwrap();
    assert_eq!(south.status.as_str(), "Submitted");
    assert!(h.store.get_archived("south-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_status_validation() {
    let h = Harness::new().await;
    let admin = h.superadmin();

    for status in ["Resolved", "Rejected", "Submitted", "Closed"] {
        let (code, body) = h
            .call("setIssueStatus", Some(&admin), json!({ "issueId": "north-1", "status": status }))
            .await;
        assert_eq!(code, StatusCode::BAD_REQUEST, "{}", status);
        assert_eq!(error_status(&body), "INVALID_ARGUMENT");
    }

    let (code, body) = h
        .call("setIssueStatus", Some(&admin), json!({ "issueId": "north-1", "status": "OnHold" }))
        .await;
    assert_eq!(code, StatusCode::OK);
    assert!(body["result"]["result"].as_str().unwrap().contains("OnHold"));
}

#[tokio::test]
async fn test_missing_issue_id() {
    let h = Harness::new().await;
    let (status, body) = h.call("rejectIssue", Some(&h.superadmin()), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_status(&body), "INVALID_ARGUMENT");
}

// =============================================================================
// Dashboard reads
// =============================================================================

fn ids(body: &Value) -> Vec<&str> {
    body["result"]
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["id"].as_str()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_list_issues_scoped_to_zone() {
    let h = Harness::new().await;

    let (status, body) = h.call("listIssues", Some(&h.authority("BLRN")), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), ["north-1"]);

    // An authority cannot widen its scope by naming another zone
    let (status, body) = h
        .call("listIssues", Some(&h.authority("BLRN")), json!({ "zone": "BLRS" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_status(&body), "PERMISSION_DENIED");

    let (_, body) = h.call("listIssues", Some(&h.superadmin()), json!({})).await;
    let mut all = ids(&body);
    all.sort();
    assert_eq!(all, ["north-1", "south-1"]);

    let (_, body) = h
        .call("listIssues", Some(&h.superadmin()), json!({ "zone": "BLRS" }))
        .await;
    assert_eq!(ids(&body), ["south-1"]);
}

#[tokio::test]
async fn test_list_issues_by_status() {
    let h = Harness::new().await;
    let admin = h.superadmin();
    h.call("setIssueStatus", Some(&admin), json!({ "issueId": "south-1", "status": "OnHold" }))
        .await;

    let (_, body) = h
        .call("listIssues", Some(&admin), json!({ "statuses": ["OnHold", "InProgress"] }))
        .await;
    assert_eq!(ids(&body), ["south-1"]);

    let (status, body) = h
        .call("listIssues", Some(&admin), json!({ "statuses": ["Resolved"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_status(&body), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_resolved_list_and_counts_per_zone() {
    let h = Harness::new().await;
    let north = h.authority("BLRN");
    let (status, _) = h
        .call("resolveIssue", Some(&north), json!({ "issueId": "north-1" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.call("listResolvedIssues", Some(&north), json!({})).await;
    assert_eq!(ids(&body), ["north-1"]);
    assert_eq!(body["result"][0]["resolvedBy"], "auth-BLRN");

    let (_, body) = h
        .call("listResolvedIssues", Some(&h.authority("BLRS")), json!({}))
        .await;
    assert!(ids(&body).is_empty());

    let (_, body) = h.call("getIssueCounts", Some(&north), json!({})).await;
    assert_eq!(body["result"]["zone"], "BLRN");
    assert_eq!(body["result"]["active"], 0);
    assert_eq!(body["result"]["resolved"], 1);

    let (_, body) = h.call("getIssueCounts", Some(&h.superadmin()), json!({})).await;
    assert!(body["result"]["zone"].is_null());
    assert_eq!(body["result"]["active"], 1);
    assert_eq!(body["result"]["resolved"], 1);
    assert_eq!(body["result"]["submittedToday"], 1);
}

#[tokio::test]
async fn test_nearby_issues_stay_in_zone() {
    let h = Harness::new().await;
    for (id, code) in [("north-2", "BLRN"), ("south-2", "BLRS")] {
        let issue = Issue::submitted(id, "Pothole", zone(code), "citizen-1")
            .with_location(12.9716, 77.5946);
        geo::insert_indexed(h.store.as_ref(), issue).await.unwrap();
    }
    let near = json!({ "latitude": 12.9717, "longitude": 77.5947 });

    let (status, body) = h
        .call("findNearbyIssues", Some(&h.authority("BLRN")), near.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), ["north-2"]);

    let (_, body) = h.call("findNearbyIssues", Some(&h.superadmin()), near).await;
    assert_eq!(ids(&body).len(), 2);

    let (status, _) = h
        .call("findNearbyIssues", Some(&h.superadmin()), json!({ "latitude": 12.97 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_authorities_superadmin_only() {
    let h = Harness::new().await;
    let (status, _) = h
        .call(
            "createAuthority",
            Some(&h.superadmin()),
            json!({ "name": "Asha", "email": "asha@example.com", "zone": "BLRE" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.call("listAuthorities", Some(&h.superadmin()), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"][0]["name"], "Asha");
    assert_eq!(body["result"][0]["zone"], "BLRE");
    assert!(body["result"][0]["uid"].as_str().is_some_and(|uid| !uid.is_empty()));

    let (status, body) = h
        .call("listAuthorities", Some(&h.authority("BLRE")), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_status(&body), "PERMISSION_DENIED");
}

// =============================================================================
// Provisioning, reporters, verification
// =============================================================================

#[tokio::test]
async fn test_create_authority() {
    let h = Harness::new().await;
    let data = json!({ "name": "Asha", "email": "a@x.com", "phone": null, "zone": "BLRE" });

    let (status, body) = h.call("createAuthority", Some(&h.authority("BLRN")), data.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_status(&body), "PERMISSION_DENIED");
    assert!(h.identities.is_empty());

    let (status, body) = h.call("createAuthority", Some(&h.superadmin()), data).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"]["result"],
        "Successfully created authority Asha (a@x.com)."
    );

    let identity = h.identities.find_by_email("a@x.com").unwrap();
    let stored = h.identities.get_identity(&identity.uid).await.unwrap().unwrap();
    assert_eq!(stored.claims, Some(CallerRole::Authority { zone: zone("BLRE") }));
    assert_eq!(
        h.store.get_authority(&identity.uid).await.unwrap(),
        Some(AuthorityProfile {
            name: "Asha".into(),
            email: "a@x.com".into(),
            phone: None,
            zone: zone("BLRE"),
        })
    );
}

#[tokio::test]
async fn test_get_user_details() {
    let h = Harness::new().await;
    let auth = h.authority("BLRS");

    let (status, body) = h
        .call("getUserDetails", Some(&auth), json!({ "userId": "citizen-1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["name"], "Ravi");
    assert_eq!(body["result"]["address"], "12 MG Road");

    let (status, _) = h.call("getUserDetails", Some(&auth), json!({ "userId": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_verification_code_needs_no_token() {
    let h = Harness::new().await;
    let (status, body) = h
        .call("sendVerificationCode", None, json!({ "email": "ravi@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let otp = body["result"]["otp"].as_str().unwrap().to_string();
    assert_eq!(otp.len(), 6);

    let sent = h.outbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, format!("Your OTP is: {}", otp));

    drop(sent);
    let (status, _) = h.call("sendVerificationCode", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_procedure() {
    let h = Harness::new().await;
    let (status, body) = h.call("dropDatabase", Some(&h.superadmin()), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_status(&body), "NOT_FOUND");

    // What is left of a doubled `/api/api/...` path
    let (status, _) = h
        .call("api/createAuthority", Some(&h.superadmin()), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_accepted() {
    let h = Harness::new().await;
    let token = h.superadmin().replacen("Bearer", "bearer", 1);
    let (status, _) = h.call("getIssueCounts", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Error hygiene
// =============================================================================

/// Profile store that fails with a detailed backend error
struct BrokenProfiles;

#[async_trait]
impl ProfileRepository for BrokenProfiles {
    async fn put_authority(
        &self,
        _uid: &str,
        _profile: AuthorityProfile,
    ) -> civic_watch::Result<()> {
        Err(CivicError::Database("replica set primary 10.1.2.3 unreachable".into()))
    }

    async fn get_authority(&self, _uid: &str) -> civic_watch::Result<Option<AuthorityProfile>> {
        Err(CivicError::Database("replica set primary 10.1.2.3 unreachable".into()))
    }

    async fn get_reporter(&self, _uid: &str) -> civic_watch::Result<Option<ReporterProfile>> {
        Err(CivicError::Database("replica set primary 10.1.2.3 unreachable".into()))
    }

    async fn list_authorities(&self) -> civic_watch::Result<Vec<AuthorityEntry>> {
        Err(CivicError::Database("replica set primary 10.1.2.3 unreachable".into()))
    }
}

#[tokio::test]
async fn test_internal_errors_do_not_leak() {
    let mut h = Harness::new().await;
    h.state.profiles = Arc::new(BrokenProfiles);

    let (status, body) = h
        .call("getUserDetails", Some(&h.superadmin()), json!({ "userId": "citizen-1" }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_status(&body), "INTERNAL");
    assert_eq!(body["error"]["message"], "Internal error.");
    assert!(!body.to_string().contains("10.1.2.3"));

    // Provisioning against the broken store rolls the identity back
    let (status, _) = h
        .call(
            "createAuthority",
            Some(&h.superadmin()),
            json!({ "name": "Asha", "email": "a@x.com", "zone": "BLRE" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.identities.is_empty());
}
