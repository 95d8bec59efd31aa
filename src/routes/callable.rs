//! Callable procedures
//!
//! Each procedure is `POST /api/<name>` with body `{"data": {...}}` and a
//! bearer token. Success is `{"result": ...}`; failure is
//! `{"error": {"status": "<CODE>", "message": "..."}}` with the matching
//! HTTP status. Internal failures are logged here and reach the caller only
//! as a generic message.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::auth::Caller;
use crate::lifecycle::{self, IssueStatus};
use crate::model::{GeoPoint, Zone};
use crate::server::AppState;
use crate::services::{self, NewAuthority};
use crate::types::{CivicError, ErrorCode, Result};

/// Procedure names
pub const CREATE_AUTHORITY: &str = "createAuthority";
pub const RESOLVE_ISSUE: &str = "resolveIssue";
pub const SET_ISSUE_STATUS: &str = "setIssueStatus";
pub const REJECT_ISSUE: &str = "rejectIssue";
pub const GET_USER_DETAILS: &str = "getUserDetails";
pub const SEND_VERIFICATION_CODE: &str = "sendVerificationCode";
pub const LIST_ISSUES: &str = "listIssues";
pub const LIST_RESOLVED_ISSUES: &str = "listResolvedIssues";
pub const FIND_NEARBY_ISSUES: &str = "findNearbyIssues";
pub const GET_ISSUE_COUNTS: &str = "getIssueCounts";
pub const LIST_AUTHORITIES: &str = "listAuthorities";

#[derive(Debug, Default, Deserialize)]
struct CallableRequest {
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueData {
    #[serde(default)]
    issue_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution_details: Option<String>,
}

impl IssueData {
    fn issue_id(&self) -> &str {
        self.issue_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    #[serde(default)]
    user_id: Option<String>,
}

/// Read filters; `zone` is only honoured as far as the caller's scope allows
#[derive(Debug, Default, Deserialize)]
struct ScopeData {
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    statuses: Vec<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    precision: Option<usize>,
}

impl ScopeData {
    fn zone(&self) -> Result<Option<Zone>> {
        self.zone
            .as_deref()
            .filter(|z| !z.trim().is_empty())
            .map(Zone::parse)
            .transpose()
    }

    fn statuses(&self) -> Result<Vec<IssueStatus>> {
        self.statuses.iter().map(|s| s.trim().parse()).collect()
    }

    fn point(&self) -> Result<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(GeoPoint::new(latitude, longitude)),
            _ => Err(CivicError::InvalidArgument(
                "Latitude and longitude are required.".into(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EmailData {
    #[serde(default)]
    email: Option<String>,
}

/// `data` as `T`; an absent or null payload is treated as `{}`
fn parse_data<T: DeserializeOwned + Default>(data: Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
        .map_err(|e| CivicError::InvalidArgument(format!("Malformed request data: {}", e)))
}

fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let request: CallableRequest = serde_json::from_slice(body)
        .map_err(|e| CivicError::InvalidArgument(format!("Malformed request body: {}", e)))?;
    Ok(request.data)
}

async fn invoke(
    state: &AppState,
    procedure: &str,
    auth_header: Option<&str>,
    body: &[u8],
) -> Result<Value> {
    let data = parse_body(body)?;

    if procedure == SEND_VERIFICATION_CODE {
        let EmailData { email } = parse_data(data)?;
        let otp = services::send_verification_code(
            state.delivery.as_ref(),
            email.as_deref().unwrap_or_default(),
        )
        .await?;
        return Ok(json!({ "otp": otp }));
    }

    if !is_guarded(procedure) {
        return Err(CivicError::NotFound(format!(
            "Unknown procedure '{}'.",
            procedure
        )));
    }

    let caller: Caller = state.jwt.authenticate(auth_header)?;
    debug!(procedure, caller = %caller.uid, role = %caller.role.kind(), "Callable invoked");

    match procedure {
        CREATE_AUTHORITY => {
            let request: NewAuthority = parse_data(data)?;
            let message = services::create_authority(
                state.identities.as_ref(),
                state.profiles.as_ref(),
                &caller,
                request,
            )
            .await?;
            Ok(json!({ "result": message }))
        }
        RESOLVE_ISSUE => {
            let request: IssueData = parse_data(data)?;
            let outcome = services::resolve(
                state.issues.as_ref(),
                &caller,
                request.issue_id(),
                request.resolution_details.as_deref(),
            )
            .await?;
            to_result(&outcome)
        }
        SET_ISSUE_STATUS => {
            let request: IssueData = parse_data(data)?;
            let status = request
                .status
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CivicError::InvalidArgument("Status is required.".into()))?;
            let target: IssueStatus = status.parse()?;
            let message =
                lifecycle::set_status(state.issues.as_ref(), &caller, request.issue_id(), target)
                    .await?;
            Ok(json!({ "result": message }))
        }
        REJECT_ISSUE => {
            let request: IssueData = parse_data(data)?;
            let message =
                lifecycle::reject(state.issues.as_ref(), &caller, request.issue_id()).await?;
            Ok(json!({ "result": message }))
        }
        GET_USER_DETAILS => {
            let request: UserData = parse_data(data)?;
            let profile = services::get_user_details(
                state.profiles.as_ref(),
                &caller,
                request.user_id.as_deref().unwrap_or_default(),
            )
            .await?;
            to_result(&profile)
        }
        LIST_ISSUES => {
            let request: ScopeData = parse_data(data)?;
            let issues = services::list_issues(
                state.issues.as_ref(),
                &caller,
                request.zone()?,
                &request.statuses()?,
            )
            .await?;
            to_result(&issues)
        }
        LIST_RESOLVED_ISSUES => {
            let request: ScopeData = parse_data(data)?;
            let archived =
                services::list_resolved_issues(state.issues.as_ref(), &caller, request.zone()?)
                    .await?;
            to_result(&archived)
        }
        FIND_NEARBY_ISSUES => {
            let request: ScopeData = parse_data(data)?;
            let issues = services::find_nearby_issues(
                state.issues.as_ref(),
                &caller,
                request.zone()?,
                request.point()?,
                request.precision,
            )
            .await?;
            to_result(&issues)
        }
        GET_ISSUE_COUNTS => {
            let request: ScopeData = parse_data(data)?;
            let counts =
                services::get_issue_counts(state.issues.as_ref(), &caller, request.zone()?)
                    .await?;
            to_result(&counts)
        }
        LIST_AUTHORITIES => {
            let authorities =
                services::list_authorities(state.profiles.as_ref(), &caller).await?;
            to_result(&authorities)
        }
        _ => Err(CivicError::NotFound(format!(
            "Unknown procedure '{}'.",
            procedure
        ))),
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| CivicError::Internal(format!("Failed to encode result: {}", e)))
}

fn is_guarded(procedure: &str) -> bool {
    matches!(
        procedure,
        CREATE_AUTHORITY
            | RESOLVE_ISSUE
            | SET_ISSUE_STATUS
            | REJECT_ISSUE
            | GET_USER_DETAILS
            | LIST_ISSUES
            | LIST_RESOLVED_ISSUES
            | FIND_NEARBY_ISSUES
            | GET_ISSUE_COUNTS
            | LIST_AUTHORITIES
    )
}

/// Error envelope for `err`, logging anything internal
pub fn error_body(procedure: &str, err: &CivicError) -> (StatusCode, Value) {
    let code = err.code();
    match code {
        ErrorCode::Internal => error!(procedure, error = %err, "Callable failed"),
        _ => warn!(procedure, error = %err, "Callable rejected"),
    }
    (
        code.status_code(),
        json!({
            "error": {
                "status": code.as_str(),
                "message": err.public_message(),
            }
        }),
    )
}

/// Run `procedure` and produce the status and JSON envelope
pub async fn dispatch(
    state: &AppState,
    procedure: &str,
    auth_header: Option<&str>,
    body: &[u8],
) -> (StatusCode, Value) {
    match invoke(state, procedure, auth_header, body).await {
        Ok(result) => (StatusCode::OK, json!({ "result": result })),
        Err(err) => error_body(procedure, &err),
    }
}

/// HTTP response for a dispatched procedure
pub async fn handle_callable(
    state: &AppState,
    procedure: &str,
    auth_header: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let (status, body) = dispatch(state, procedure, auth_header, body).await;

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_parsing() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(
            parse_body(br#"{"data":{"issueId":"i-1"}}"#).unwrap(),
            json!({"issueId": "i-1"})
        );
        assert!(matches!(
            parse_body(b"not json"),
            Err(CivicError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_issue_data_camel_case() {
        let data: IssueData =
            parse_data(json!({"issueId": "i-1", "resolutionDetails": "Filled"})).unwrap();
        assert_eq!(data.issue_id(), "i-1");
        assert_eq!(data.resolution_details.as_deref(), Some("Filled"));

        let empty: IssueData = parse_data(Value::Null).unwrap();
        assert_eq!(empty.issue_id(), "");
    }

    #[test]
    fn test_scope_data() {
        let data: ScopeData =
            parse_data(json!({"zone": " BLRN ", "statuses": ["Submitted", "OnHold"]})).unwrap();
        assert_eq!(data.zone().unwrap(), Some(Zone::parse("BLRN").unwrap()));
        assert_eq!(
            data.statuses().unwrap(),
            vec![IssueStatus::Submitted, IssueStatus::OnHold]
        );
        assert!(data.point().is_err());

        let blank: ScopeData = parse_data(json!({"zone": ""})).unwrap();
        assert_eq!(blank.zone().unwrap(), None);

        let bad: ScopeData = parse_data(json!({"statuses": ["closed"]})).unwrap();
        assert!(matches!(bad.statuses(), Err(CivicError::InvalidArgument(_))));
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let (status, body) = error_body(
            RESOLVE_ISSUE,
            &CivicError::Database("connection reset by 10.0.0.7".into()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["status"], "INTERNAL");
        assert_eq!(body["error"]["message"], "Internal error.");
    }
}
