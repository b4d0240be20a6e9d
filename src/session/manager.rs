use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, RwLock, watch};

use crate::api::{ApiClient, endpoints, error_from};
use crate::error::{Error, Result};
use crate::utils::decode_claims;

use super::model::{REFRESH_TOKEN_KEY, Session, SessionStatus, TOKEN_KEY, USER_KEY, User};
use super::store::TokenStore;
use super::validate;

/// 正在进行的刷新，所有等待者共享同一个结果
type RefreshFlight = Shared<BoxFuture<'static, Option<String>>>;

/// 会话与令牌管理器。克隆后共享同一份会话状态
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    session: RwLock<Session>,
    // 每次建立或清除会话时递增，只在持有会话写锁时修改
    generation: AtomicU64,
    status: watch::Sender<SessionStatus>,
    inflight: Mutex<Option<RefreshFlight>>,
}

impl SessionManager {
    /// 从本地存储恢复会话，进程启动时调用一次
    pub fn hydrate(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        let access_token = store.get(TOKEN_KEY);
        let refresh_token = store.get(REFRESH_TOKEN_KEY);
        let user = store
            .get(USER_KEY)
            .and_then(|raw| match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!("Discarding unreadable cached user: {}", e);
                    None
                }
            });

        let status = if access_token.is_some() {
            tracing::info!("Restored persisted session, pending profile verification");
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        };

        let (status_tx, _) = watch::channel(status);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                session: RwLock::new(Session {
                    access_token,
                    refresh_token,
                    user,
                }),
                generation: AtomicU64::new(0),
                status: status_tx,
                inflight: Mutex::new(None),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// 当前会话的只读快照
    pub async fn session(&self) -> Session {
        self.inner.session.read().await.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.session.read().await.user.clone()
    }

    pub async fn token_expiry(&self) -> Option<DateTime<Utc>> {
        let session = self.inner.session.read().await;
        decode_claims(session.access_token.as_deref()?)?.expires_at()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        validate::login(username, password)?;
        let username = username.trim();

        let tokens = self.inner.api.obtain_tokens(username, password).await?;
        let user = User {
            id: user_id_from(&tokens.access),
            username: username.to_string(),
        };
        self.inner
            .establish(tokens.access, Some(tokens.refresh), user.clone())
            .await?;
        tracing::info!("User {} logged in", username);

        // 登录后拉取用户资料
        match self.verify().await {
            Ok(profile) => Ok(profile),
            Err(Error::Authentication(message)) => Err(Error::Authentication(message)),
            Err(e) => {
                tracing::warn!("Profile fetch after login failed: {}", e);
                Ok(user)
            }
        }
    }

    /// 注册成功时接口直接返回令牌，不再额外登录
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User> {
        validate::registration(username, password, confirm_password)?;
        let username = username.trim();

        let registered = self
            .inner
            .api
            .register(username, password, confirm_password)
            .await?;
        let Some(access) = registered.access else {
            return Err(Error::Registration {
                message: "Registration response carried no access token".to_string(),
                reasons: Vec::new(),
            });
        };

        let user = User {
            id: user_id_from(&access),
            username: registered.username.unwrap_or_else(|| username.to_string()),
        };
        self.inner
            .establish(access, registered.refresh, user.clone())
            .await?;
        tracing::info!("Registered user {}", user.username);
        Ok(user)
    }

    pub async fn logout(&self) {
        self.inner.clear().await;
        tracing::info!("Logged out");
    }

    /// 拉取当前用户资料，同时作为受保护接口的连通性检查
    pub async fn verify(&self) -> Result<User> {
        let mut profile: User = self.get_json(endpoints::ME).await?;
        if profile.id.is_none() {
            let session = self.inner.session.read().await;
            profile.id = session.access_token.as_deref().and_then(user_id_from);
        }
        self.inner.remember_user(&profile).await;
        Ok(profile)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        decode_body(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        decode_body(response).await
    }

    /// 带令牌发送请求；收到 401 时最多刷新一次并重试
    pub async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let token = self.inner.session.read().await.access_token.clone();
        let response = self
            .dispatch(method.clone(), path, body, token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("{} {} returned 401, renewing access token", method, path);
        let Some(fresh) = self.refreshed_token(token.as_deref()).await else {
            return Err(Error::Authentication(
                "Session expired, please log in again".to_string(),
            ));
        };

        let retried = self.dispatch(method, path, body, Some(&fresh)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication("Unauthorized".to_string()));
        }
        Ok(retried)
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut request = self.inner.api.request(method, path);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// 加入正在进行的刷新，或在没有刷新时发起一次
    async fn refreshed_token(&self, stale: Option<&str>) -> Option<String> {
        let flight = {
            let mut slot = self.inner.inflight.lock().await;
            if let Some(flight) = slot.clone() {
                flight
            } else {
                // 令牌已被之前的刷新替换，直接用新令牌重试
                let current = self.inner.session.read().await.access_token.clone();
                if current.is_some() && current.as_deref() != stale {
                    return current;
                }
                let flight = self.inner.clone().run_refresh().boxed().shared();
                *slot = Some(flight.clone());
                flight
            }
        };
        flight.await
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>) -> Option<String> {
        let outcome = self.renew().await;
        self.inflight.lock().await.take();
        outcome
    }

    async fn renew(&self) -> Option<String> {
        let (refresh_token, generation) = {
            let session = self.session.read().await;
            (
                session.refresh_token.clone(),
                self.generation.load(Ordering::SeqCst),
            )
        };
        let Some(refresh_token) = refresh_token else {
            tracing::debug!("No refresh token stored, session cannot be renewed");
            self.clear().await;
            return None;
        };

        self.status.send_replace(SessionStatus::Refreshing);
        let renewed = self.api.refresh(&refresh_token).await;

        let mut session = self.session.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            // 刷新期间已登出或重新登录，保留当前会话
            tracing::debug!("Session changed during refresh, discarding result");
            let current = session.access_token.clone();
            self.status.send_replace(if current.is_some() {
                SessionStatus::Authenticated
            } else {
                SessionStatus::Anonymous
            });
            return current;
        }

        // 先持久化，再更新内存中的令牌
        let persisted = renewed.and_then(|access| {
            self.store.set(TOKEN_KEY, &access)?;
            Ok(access)
        });

        match persisted {
            Ok(access) => {
                session.access_token = Some(access.clone());
                drop(session);
                self.status.send_replace(SessionStatus::Authenticated);
                tracing::info!("Access token refreshed");
                Some(access)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, ending session: {}", e);
                *session = Session::default();
                self.generation.fetch_add(1, Ordering::SeqCst);
                drop(session);
                self.forget_persisted();
                self.status.send_replace(SessionStatus::Anonymous);
                None
            }
        }
    }

    async fn establish(&self, access: String, refresh: Option<String>, user: User) -> Result<()> {
        let user_json = serde_json::to_string(&user).map_err(std::io::Error::from)?;
        let persisted = self.store.set(TOKEN_KEY, &access).and_then(|()| {
            match &refresh {
                Some(refresh) => self.store.set(REFRESH_TOKEN_KEY, refresh)?,
                None => self.store.remove(REFRESH_TOKEN_KEY)?,
            }
            self.store.set(USER_KEY, &user_json)
        });
        if let Err(e) = persisted {
            // 不留下写了一半的会话
            tracing::warn!("Failed to persist new session: {}", e);
            self.clear().await;
            return Err(e.into());
        }

        let mut session = self.session.write().await;
        *session = Session {
            access_token: Some(access),
            refresh_token: refresh,
            user: Some(user),
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(session);
        self.status.send_replace(SessionStatus::Authenticated);
        Ok(())
    }

    async fn remember_user(&self, user: &User) {
        let mut session = self.session.write().await;
        if session.access_token.is_none() {
            return;
        }
        match serde_json::to_string(user) {
            Ok(raw) => {
                if let Err(e) = self.store.set(USER_KEY, &raw) {
                    tracing::warn!("Failed to persist user profile: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to encode user profile: {}", e),
        }
        session.user = Some(user.clone());
    }

    async fn clear(&self) {
        let mut session = self.session.write().await;
        *session = Session::default();
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(session);
        self.forget_persisted();
        self.status.send_replace(SessionStatus::Anonymous);
    }

    fn forget_persisted(&self) {
        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!("Failed to remove {} from token store: {}", key, e);
            }
        }
    }
}

fn user_id_from(access: &str) -> Option<i64> {
    decode_claims(access)?.user_id()
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    Ok(response.json::<T>().await?)
}
