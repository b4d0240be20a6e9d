#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Notify;
use urlguard::{
    api::ApiClient,
    session::{MemoryStore, SessionManager, TokenStore},
};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "s3cure-pass!";
pub const REFRESH_TOKEN: &str = "refresh-alice";
pub const USER_ID: i64 = 7;
pub const COMMON_PASSWORD: &str = "password123";

type BearerHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

#[derive(Default)]
pub struct Calls {
    pub token: AtomicUsize,
    pub refresh: AtomicUsize,
    pub register: AtomicUsize,
    pub me: AtomicUsize,
    pub predict: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        [&self.token, &self.refresh, &self.register, &self.me, &self.predict]
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

/// 关闭时请求停在处理函数里，直到测试放行
#[derive(Default)]
pub struct Gate {
    held: AtomicBool,
    opened: Notify,
}

impl Gate {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.opened.notify_one();
    }

    async fn pass(&self) {
        if self.held.load(Ordering::SeqCst) {
            self.opened.notified().await;
        }
    }
}

/// 模拟后端：只有最近签发的访问令牌有效
pub struct MockState {
    pub calls: Calls,
    pub refresh_gate: Gate,
    pub me_gate: Gate,
    current_access: Mutex<String>,
    issued: AtomicUsize,
    refresh_ok: AtomicBool,
    revoked_all: AtomicBool,
    prediction: Mutex<(StatusCode, Value)>,
}

impl MockState {
    fn issue_access(&self) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let exp = chrono::Utc::now().timestamp() + 300;
        let token = encode(
            &Header::default(),
            &json!({"token_type": "access", "user_id": USER_ID, "jti": serial, "exp": exp}),
            &EncodingKey::from_secret(b"mock-backend-secret"),
        )
        .unwrap();
        *self.current_access.lock().unwrap() = token.clone();
        token
    }

    fn authorized(&self, auth: &BearerHeader) -> bool {
        if self.revoked_all.load(Ordering::SeqCst) {
            return false;
        }
        match auth {
            Ok(TypedHeader(Authorization(bearer))) => {
                bearer.token() == self.current_access.lock().unwrap().as_str()
            }
            Err(_) => false,
        }
    }
}

pub struct MockBackend {
    pub base: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            calls: Calls::default(),
            refresh_gate: Gate::default(),
            me_gate: Gate::default(),
            current_access: Mutex::new(String::new()),
            issued: AtomicUsize::new(0),
            refresh_ok: AtomicBool::new(true),
            revoked_all: AtomicBool::new(false),
            prediction: Mutex::new((
                StatusCode::OK,
                json!({"malicious": false, "malicious_prob": 0.02}),
            )),
        });

        let app = Router::new()
            .route("/api/token/", post(token))
            .route("/api/token/refresh/", post(refresh))
            .route("/api/register/", post(register))
            .route("/api/me/", get(me))
            .route("/api/predict/", post(predict))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}/api"),
            state,
        }
    }

    pub fn calls(&self) -> &Calls {
        &self.state.calls
    }

    pub fn current_access(&self) -> String {
        self.state.current_access.lock().unwrap().clone()
    }

    /// 让客户端持有的访问令牌失效
    pub fn expire_access(&self) {
        *self.state.current_access.lock().unwrap() = "revoked".to_string();
    }

    /// 包括刷新后签发的令牌在内，一律返回 401
    pub fn revoke_every_token(&self) {
        self.state.revoked_all.store(true, Ordering::SeqCst);
    }

    pub fn refresh_gate(&self) -> &Gate {
        &self.state.refresh_gate
    }

    pub fn me_gate(&self) -> &Gate {
        &self.state.me_gate
    }

    pub fn reject_refresh(&self) {
        self.state.refresh_ok.store(false, Ordering::SeqCst);
    }

    pub fn respond_to_predict(&self, status: StatusCode, body: Value) {
        *self.state.prediction.lock().unwrap() = (status, body);
    }

    pub fn manager(&self) -> (SessionManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::hydrate(ApiClient::new(self.base.as_str()), store.clone());
        (manager, store)
    }

    pub fn manager_with_flaky_store(&self) -> (SessionManager, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let manager = SessionManager::hydrate(ApiClient::new(self.base.as_str()), store.clone());
        (manager, store)
    }
}

/// 对指定键的写入返回磁盘错误，其余操作交给内存存储
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }
}

impl TokenStore for FlakyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(io::Error::other("disk full"));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.inner.remove(key)
    }
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: Option<String>,
}

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
    password: String,
    password2: String,
}

async fn token(State(state): State<Arc<MockState>>, Json(body): Json<Credentials>) -> Response {
    state.calls.token.fetch_add(1, Ordering::SeqCst);
    if body.username != USERNAME || body.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    Json(json!({"access": state.issue_access(), "refresh": REFRESH_TOKEN})).into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<RefreshBody>) -> Response {
    state.calls.refresh.fetch_add(1, Ordering::SeqCst);
    // 拉长刷新耗时，让并发请求都排到同一次刷新上
    tokio::time::sleep(Duration::from_millis(100)).await;
    state.refresh_gate.pass().await;

    let valid = body.refresh.as_deref() == Some(REFRESH_TOKEN);
    if !valid || !state.refresh_ok.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})),
        )
            .into_response();
    }
    Json(json!({"access": state.issue_access()})).into_response()
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<RegisterBody>) -> Response {
    state.calls.register.fetch_add(1, Ordering::SeqCst);
    if body.password != body.password2 {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Passwords do not match"})))
            .into_response();
    }
    if body.username == "taken" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Username already exists"})))
            .into_response();
    }
    if body.password == COMMON_PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Password validation failed",
                "reasons": ["This password is too common."]
            })),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({
            "username": body.username,
            "access": state.issue_access(),
            "refresh": REFRESH_TOKEN
        })),
    )
        .into_response()
}

async fn me(State(state): State<Arc<MockState>>, auth: BearerHeader) -> Response {
    state.calls.me.fetch_add(1, Ordering::SeqCst);
    state.me_gate.pass().await;
    if !state.authorized(&auth) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
            .into_response();
    }
    Json(json!({"username": USERNAME})).into_response()
}

async fn predict(
    State(state): State<Arc<MockState>>,
    auth: BearerHeader,
    Json(_body): Json<Value>,
) -> Response {
    state.calls.predict.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&auth) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
            .into_response();
    }
    let (status, body) = state.prediction.lock().unwrap().clone();
    (status, Json(body)).into_response()
}
