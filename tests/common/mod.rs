//! Purpose: In-process fake of the storage admin API for integration tests.
//! Exports: `FakeAdmin` (server handle) and `ROOT_ACCESS_KEY`/`ROOT_SECRET_KEY`.
//! Role: Lets library and CLI tests run full round trips without a real storage service.
//! Invariants: Every request must carry a valid SigV4 signature for the root credentials.
//! Invariants: State is in-memory and per-server; canned policies are seeded at start.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use objadm::api::{AdminClient, Credentials, HostRegistry, Transport};
use objadm::core::sign::{self, SigningRequest, SigningTime};
use serde_json::{Value, json};
use url::Url;

pub const ROOT_ACCESS_KEY: &str = "minioadmin";
pub const ROOT_SECRET_KEY: &str = "minioadmin-secret";

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Default)]
struct UserRecord {
    secret_key: String,
    status: String,
    policy: Option<String>,
}

#[derive(Default)]
struct GroupRecord {
    members: Vec<String>,
    status: String,
    policy: Option<String>,
}

#[derive(Default)]
struct AdminState {
    users: BTreeMap<String, UserRecord>,
    groups: BTreeMap<String, GroupRecord>,
    policies: BTreeMap<String, Value>,
}

struct Shared {
    state: Mutex<AdminState>,
    requests: AtomicUsize,
}

pub struct FakeAdmin {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeAdmin {
    pub fn start() -> TestResult<Self> {
        let mut state = AdminState::default();
        for name in ["readonly", "readwrite", "writeonly"] {
            state.policies.insert(name.to_string(), canned_document(name));
        }
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            requests: AtomicUsize::new(0),
        });

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = Router::new().fallback(handle).with_state(shared.clone());

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Ok(Self {
            addr,
            shared,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests that reached the server, signed or not.
    pub fn request_count(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// Registers this server as `alias` in a registry rooted at `config_dir`.
    pub fn register(&self, config_dir: &std::path::Path, alias: &str) -> TestResult<HostRegistry> {
        let registry = HostRegistry::in_dir(config_dir);
        registry.add(alias, &self.url(), ROOT_ACCESS_KEY, ROOT_SECRET_KEY)?;
        Ok(registry)
    }

    pub fn client(&self) -> TestResult<AdminClient> {
        let transport = Transport::new(
            "local",
            &self.url(),
            Credentials::new(ROOT_ACCESS_KEY, ROOT_SECRET_KEY),
        )?;
        Ok(AdminClient::new(transport))
    }
}

impl Drop for FakeAdmin {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn canned_document(name: &str) -> Value {
    let actions = match name {
        "readonly" => json!(["s3:GetBucketLocation", "s3:GetObject"]),
        "writeonly" => json!(["s3:PutObject"]),
        _ => json!(["s3:*"]),
    };
    json!({
        "Version": "2012-10-17",
        "Statement": [{"Effect": "Allow", "Action": actions, "Resource": ["arn:aws:s3:::*"]}]
    })
}

fn admin_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, axum::Json(json!({ "Code": code, "Message": message }))).into_response()
}

fn no_such_user(name: &str) -> Response {
    admin_error(
        StatusCode::NOT_FOUND,
        "XMinioAdminNoSuchUser",
        &format!("The specified user does not exist: {name}"),
    )
}

fn no_such_group(name: &str) -> Response {
    admin_error(
        StatusCode::NOT_FOUND,
        "XMinioAdminNoSuchGroup",
        &format!("The specified group does not exist: {name}"),
    )
}

fn no_such_policy(name: &str) -> Response {
    admin_error(
        StatusCode::NOT_FOUND,
        "XMinioAdminNoSuchPolicy",
        &format!("The canned policy does not exist: {name}"),
    )
}

fn bad_request(message: &str) -> Response {
    admin_error(StatusCode::BAD_REQUEST, "XMinioInvalidRequest", message)
}

fn ok_empty() -> Response {
    StatusCode::OK.into_response()
}

fn ok_json(value: Value) -> Response {
    (StatusCode::OK, axum::Json(value)).into_response()
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    shared.requests.fetch_add(1, Ordering::SeqCst);
    if let Err(response) = verify_signature(&method, &uri, &headers, &body) {
        return response;
    }
    let Some(operation) = uri.path().strip_prefix("/minio/admin/v3/") else {
        return admin_error(StatusCode::NOT_FOUND, "NotImplemented", "unknown path");
    };
    let query: HashMap<String, String> = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    let param = |key: &str| query.get(key).cloned().unwrap_or_default();
    let mut guard = shared.state.lock().unwrap_or_else(|poison| poison.into_inner());
    let state = &mut *guard;

    match (method, operation) {
        (Method::PUT, "add-user") => {
            let Ok(request) = serde_json::from_slice::<Value>(&body) else {
                return bad_request("invalid body");
            };
            let Some(secret_key) = request["secretKey"].as_str() else {
                return bad_request("missing secretKey");
            };
            let user = state.users.entry(param("accessKey")).or_insert_with(|| UserRecord {
                status: "enabled".to_string(),
                ..UserRecord::default()
            });
            user.secret_key = secret_key.to_string();
            ok_empty()
        }
        (Method::PUT, "set-user-status") => {
            let access_key = param("accessKey");
            let Some(user) = state.users.get_mut(&access_key) else {
                return no_such_user(&access_key);
            };
            user.status = param("status");
            ok_empty()
        }
        (Method::GET, "user-info") => {
            let access_key = param("accessKey");
            let Some(user) = state.users.get(&access_key) else {
                return no_such_user(&access_key);
            };
            let member_of: Vec<&String> = state
                .groups
                .iter()
                .filter(|(_, group)| group.members.contains(&access_key))
                .map(|(name, _)| name)
                .collect();
            ok_json(json!({
                "status": user.status,
                "policyName": user.policy.clone().unwrap_or_default(),
                "memberOf": member_of,
            }))
        }
        (Method::GET, "list-users") => {
            let users: serde_json::Map<String, Value> = state
                .users
                .iter()
                .map(|(name, user)| {
                    (
                        name.clone(),
                        json!({ "status": user.status, "policyName": user.policy }),
                    )
                })
                .collect();
            ok_json(Value::Object(users))
        }
        (Method::DELETE, "remove-user") => {
            let access_key = param("accessKey");
            if state.users.remove(&access_key).is_none() {
                return no_such_user(&access_key);
            }
            for group in state.groups.values_mut() {
                group.members.retain(|member| member != &access_key);
            }
            ok_empty()
        }
        (Method::PUT, "update-group-members") => {
            let Ok(request) = serde_json::from_slice::<Value>(&body) else {
                return bad_request("invalid body");
            };
            let group = request["group"].as_str().unwrap_or_default().to_string();
            let is_remove = request["isRemove"].as_bool().unwrap_or(false);
            let members: Vec<String> = request["members"]
                .as_array()
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|member| member.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if is_remove {
                let Some(record) = state.groups.get_mut(&group) else {
                    return no_such_group(&group);
                };
                if members.is_empty() {
                    if !record.members.is_empty() {
                        return admin_error(
                            StatusCode::BAD_REQUEST,
                            "XMinioAdminGroupNotEmpty",
                            "The specified group is not empty - cannot remove it",
                        );
                    }
                    state.groups.remove(&group);
                } else {
                    record.members.retain(|member| !members.contains(member));
                }
                return ok_empty();
            }
            if let Some(missing) = members.iter().find(|member| !state.users.contains_key(*member)) {
                return no_such_user(missing);
            }
            let record = state.groups.entry(group).or_insert_with(|| GroupRecord {
                status: "enabled".to_string(),
                ..GroupRecord::default()
            });
            for member in members {
                if !record.members.contains(&member) {
                    record.members.push(member);
                }
            }
            ok_empty()
        }
        (Method::PUT, "set-group-status") => {
            let group = param("group");
            let Some(record) = state.groups.get_mut(&group) else {
                return no_such_group(&group);
            };
            record.status = param("status");
            ok_empty()
        }
        (Method::GET, "group") => {
            let group = param("group");
            let Some(record) = state.groups.get(&group) else {
                return no_such_group(&group);
            };
            ok_json(json!({
                "name": group,
                "status": record.status,
                "members": record.members,
                "policy": record.policy.clone().unwrap_or_default(),
            }))
        }
        (Method::GET, "groups") => {
            if state.groups.is_empty() {
                return ok_json(Value::Null);
            }
            ok_json(json!(state.groups.keys().collect::<Vec<_>>()))
        }
        (Method::PUT, "add-canned-policy") => {
            let Ok(document) = serde_json::from_slice::<Value>(&body) else {
                return admin_error(StatusCode::BAD_REQUEST, "XMinioMalformedJSON", "malformed policy");
            };
            state.policies.insert(param("name"), document);
            ok_empty()
        }
        (Method::GET, "info-canned-policy") => {
            let name = param("name");
            let Some(document) = state.policies.get(&name) else {
                return no_such_policy(&name);
            };
            ok_json(json!({ "PolicyName": name, "Policy": document }))
        }
        (Method::GET, "list-canned-policies") => ok_json(json!(state.policies)),
        (Method::DELETE, "remove-canned-policy") => {
            let name = param("name");
            if matches!(name.as_str(), "readonly" | "readwrite" | "writeonly") {
                return admin_error(
                    StatusCode::BAD_REQUEST,
                    "XMinioAdminPolicyProtected",
                    "canned policies cannot be removed",
                );
            }
            if state.policies.remove(&name).is_none() {
                return no_such_policy(&name);
            }
            ok_empty()
        }
        (Method::PUT, "set-user-or-group-policy") => {
            let policy = param("policyName");
            let target = param("userOrGroup");
            if !state.policies.contains_key(&policy) {
                return no_such_policy(&policy);
            }
            if param("isGroup") == "true" {
                let Some(group) = state.groups.get_mut(&target) else {
                    return no_such_group(&target);
                };
                group.policy = Some(policy);
            } else {
                let Some(user) = state.users.get_mut(&target) else {
                    return no_such_user(&target);
                };
                user.policy = Some(policy);
            }
            ok_empty()
        }
        _ => admin_error(StatusCode::NOT_FOUND, "NotImplemented", "unknown admin operation"),
    }
}

fn verify_signature(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let denied = |code: &str| Err(admin_error(StatusCode::FORBIDDEN, code, "access denied"));

    let authorization = header("authorization");
    let credential_prefix = format!("{} Credential={ROOT_ACCESS_KEY}/", sign::ALGORITHM);
    if !authorization.starts_with(&credential_prefix) {
        return denied("InvalidAccessKeyId");
    }
    let payload_sha256 = header("x-amz-content-sha256");
    if payload_sha256 != sign::payload_hash(body) {
        return denied("XAmzContentSHA256Mismatch");
    }
    let amz_date = header("x-amz-date");
    if amz_date.len() != 16 {
        return denied("AccessDenied");
    }
    let host = header("host");
    let Ok(url) = Url::parse(&format!("http://{host}{uri}")) else {
        return denied("AccessDenied");
    };
    let signed_headers = vec![
        ("host".to_string(), host),
        ("x-amz-content-sha256".to_string(), payload_sha256.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    let at = SigningTime {
        date: amz_date[..8].to_string(),
        amz_date,
    };
    let expected = sign::authorization(
        &SigningRequest {
            method: method.as_str(),
            url: &url,
            headers: &signed_headers,
            payload_sha256: &payload_sha256,
        },
        &Credentials::new(ROOT_ACCESS_KEY, ROOT_SECRET_KEY),
        sign::DEFAULT_REGION,
        sign::SERVICE,
        &at,
    );
    if authorization != expected {
        return denied("SignatureDoesNotMatch");
    }
    Ok(())
}
