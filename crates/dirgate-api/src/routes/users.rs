//! User provisioning and search endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use dirgate_core::config::LdapSettings;
use dirgate_ldap::{
    ensure_users_ou, release, user_search_filter, DirectorySession, Scope, SearchEntry,
    UserEntry, USER_SEARCH_ATTRIBUTES,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::MessageResponse;
use crate::error::ApiError;
use crate::server::AppState;

/// Create user request. Missing fields are empty strings; the directory
/// decides whether the resulting entry is acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchUsersQuery {
    pub search: Option<String>,
}

/// POST /users - Provision a user under the users container
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    debug!("POST /users username={}", request.username);

    let ldap = &state.config.ldap;
    let mut session = state.directory.connect().await.map_err(|e| {
        error!("Directory connection failed: {}", e);
        ApiError::internal(format!("Admin bind failed: {}", e))
    })?;

    let result = provision_user(session.as_mut(), ldap, &request).await;
    release(session).await;
    result?;

    info!("Created user {}", request.username);
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

async fn provision_user(
    session: &mut dyn DirectorySession,
    ldap: &LdapSettings,
    request: &CreateUserRequest,
) -> Result<(), ApiError> {
    session
        .simple_bind(&ldap.admin_dn(), &ldap.admin_password)
        .await
        .map_err(|e| {
            error!("Admin bind failed: {}", e);
            ApiError::internal(format!("Admin bind failed: {}", e))
        })?;

    ensure_users_ou(session, &ldap.users_ou_dn())
        .await
        .map_err(|e| {
            error!("{}", e);
            ApiError::internal(format!("OU verification failed: {}", e))
        })?;

    let entry = UserEntry::new(
        &request.username,
        &request.password,
        &request.email,
        &request.first_name,
        &request.last_name,
    );
    let dn = entry.dn(ldap);

    session.add(&dn, entry.attributes()).await.map_err(|e| {
        warn!("Adding {} rejected: {}", dn, e);
        ApiError::directory("User creation failed", &e)
    })
}

/// GET /users?search=term - Prefix search on uid, cn and mail
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchUsersQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let term = query.search.unwrap_or_default();
    debug!("GET /users search={}", term);

    let ldap = &state.config.ldap;
    let mut session = state.directory.connect().await.map_err(|e| {
        error!("Directory connection failed: {}", e);
        ApiError::internal("LDAP bind failed")
    })?;

    let result = find_users(session.as_mut(), ldap, &term).await;
    release(session).await;

    let users = result?;
    debug!("Found {} users", users.len());
    Ok(Json(users))
}

async fn find_users(
    session: &mut dyn DirectorySession,
    ldap: &LdapSettings,
    term: &str,
) -> Result<Vec<Value>, ApiError> {
    session
        .simple_bind(&ldap.admin_dn(), &ldap.admin_password)
        .await
        .map_err(|e| {
            error!("Admin bind failed: {}", e);
            ApiError::internal("LDAP bind failed")
        })?;

    let entries = match session
        .search(
            &ldap.users_ou_dn(),
            Scope::Subtree,
            &user_search_filter(term),
            &USER_SEARCH_ATTRIBUTES,
        )
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            error!("User search failed: {}", e);
            return Err(ApiError::internal(e.to_string()));
        }
    };

    Ok(entries.into_iter().map(entry_to_json).collect())
}

/// `{dn, attr: value}` with multi-valued attributes as arrays
fn entry_to_json(entry: SearchEntry) -> Value {
    let mut object = Map::new();
    object.insert("dn".to_string(), Value::String(entry.dn));

    for (name, mut values) in entry.attrs {
        let value = if values.len() == 1 {
            Value::String(values.remove(0))
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        object.insert(name, value);
    }

    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use dirgate_ldap::error::rc;
    use dirgate_ldap::memory::Operation;
    use dirgate_ldap::DirectoryError;
    use serde_json::json;
    use std::collections::HashMap;

    const JDOE_DN: &str = "uid=jdoe,ou=users,dc=example,dc=com";

    #[tokio::test]
    async fn test_create_user_round_trip() {
        let dir = directory();
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", jdoe())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "message": "User created successfully" }));

        let entry = dir.entry(JDOE_DN).unwrap();
        assert_eq!(entry.attrs["cn"], vec!["Jane Doe".to_string()]);
        assert_eq!(entry.attrs["sn"], vec!["Doe".to_string()]);
        assert_eq!(entry.attrs["objectClass"].len(), 4);
        assert!(dir.entry(USERS_OU_DN).is_some());

        let (status, body) = send(&app, get("/users?search=jd")).await;
        assert_eq!(status, StatusCode::OK);
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["uid"], "jdoe");
        assert_eq!(users[0]["cn"], "Jane Doe");
        assert_eq!(users[0]["mail"], "jdoe@example.com");
        assert!(users[0].get("userPassword").is_none());

        let stats = dir.stats();
        assert_eq!(stats.connects, 2);
        assert_eq!(stats.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_container_created_only_once() {
        let dir = directory();
        let app = app(&dir);

        send(&app, post_json("/users", jdoe())).await;
        let mut second = jdoe();
        second["username"] = json!("asmith");
        let (status, _) = send(&app, post_json("/users", second)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(dir.stats().add_attempts(USERS_OU_DN), 1);
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let dir = directory();
        let app = app(&dir);

        send(&app, post_json("/users", jdoe())).await;
        let (status, body) = send(&app, post_json("/users", jdoe())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], rc::ENTRY_ALREADY_EXISTS);
        assert!(!body["ldapMessage"].as_str().unwrap().is_empty());
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("User creation failed: "));
        assert_eq!(dir.stats().open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_admin_bind_failure() {
        let dir = directory();
        dir.fail_next(
            Operation::Bind,
            DirectoryError::rejected(rc::INVALID_CREDENTIALS, "", ""),
        );
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", jdoe())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Admin bind failed: Invalid Credentials");
        assert!(dir.stats().adds.is_empty());
        assert_eq!(dir.stats().open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let dir = directory();
        dir.fail_next(
            Operation::Connect,
            DirectoryError::Connection("Failed to connect to LDAP server: refused".to_string()),
        );
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", jdoe())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Admin bind failed: Failed to connect to LDAP server: refused"
        );
        assert_eq!(dir.stats().connects, 0);
        assert_eq!(dir.stats().unbinds, 0);
    }

    #[tokio::test]
    async fn test_ou_search_failure_releases_once() {
        let dir = directory();
        dir.fail_next(
            Operation::Search,
            DirectoryError::Transport("connection reset".to_string()),
        );
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", jdoe())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "OU verification failed: LDAP search failed: connection reset"
        );
        let stats = dir.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.unbinds, 1);
    }

    #[tokio::test]
    async fn test_transport_add_failure_has_no_code() {
        let dir = directory();
        dir.seed_users_ou(USERS_OU_DN);
        dir.fail_next(
            Operation::Add,
            DirectoryError::Transport("broken pipe".to_string()),
        );
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", jdoe())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "User creation failed: broken pipe" }));
    }

    #[tokio::test]
    async fn test_missing_fields_reach_directory() {
        let dir = directory();
        let app = app(&dir);

        let (status, body) = send(&app, post_json("/users", json!({ "password": "x" }))).await;

        // uid= with an empty value is still a syntactically valid DN
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert!(dir.entry("uid=,ou=users,dc=example,dc=com").is_some());
    }

    #[tokio::test]
    async fn test_search_misses_and_lists_all() {
        let dir = directory();
        let app = app(&dir);

        send(&app, post_json("/users", jdoe())).await;
        let mut second = jdoe();
        second["username"] = json!("asmith");
        second["firstName"] = json!("Alice");
        second["lastName"] = json!("Smith");
        second["email"] = json!("alice@example.com");
        send(&app, post_json("/users", second)).await;

        let (status, body) = send(&app, get("/users?search=zzz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (_, body) = send(&app, get("/users")).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(&app, get("/users?search=alice%40")).await;
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["uid"], "asmith");
    }

    #[tokio::test]
    async fn test_search_term_cannot_widen_filter() {
        let dir = directory();
        let app = app(&dir);
        send(&app, post_json("/users", jdoe())).await;

        let (status, body) = send(&app, get("/users?search=*")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_search_before_container_exists() {
        let dir = directory();
        let app = app(&dir);

        let (status, body) = send(&app, get("/users?search=jd")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "No Such Object" }));
        let stats = dir.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.unbinds, 1);
    }

    #[tokio::test]
    async fn test_search_bind_failure_releases() {
        let dir = directory();
        dir.fail_next(
            Operation::Bind,
            DirectoryError::rejected(rc::INVALID_CREDENTIALS, "", ""),
        );
        let app = app(&dir);

        let (status, body) = send(&app, get("/users?search=jd")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "LDAP bind failed" }));
        let stats = dir.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.unbinds, 1);
    }

    #[tokio::test]
    async fn test_search_error_is_reported() {
        let dir = directory();
        dir.seed_users_ou(USERS_OU_DN);
        dir.fail_next(
            Operation::Search,
            DirectoryError::rejected(rc::UNWILLING_TO_PERFORM, "", ""),
        );
        let app = app(&dir);

        let (status, body) = send(&app, get("/users")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Unwilling To Perform" }));
        assert_eq!(dir.stats().open_sessions(), 0);
    }

    #[test]
    fn test_entry_to_json() {
        let entry = SearchEntry {
            dn: JDOE_DN.to_string(),
            attrs: HashMap::from([
                ("uid".to_string(), vec!["jdoe".to_string()]),
                (
                    "mail".to_string(),
                    vec!["jdoe@example.com".to_string(), "jane@example.com".to_string()],
                ),
            ]),
            bin_attrs: HashMap::new(),
        };

        assert_eq!(
            entry_to_json(entry),
            json!({
                "dn": JDOE_DN,
                "uid": "jdoe",
                "mail": ["jdoe@example.com", "jane@example.com"]
            })
        );
    }
}
