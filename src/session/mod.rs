use tokio::sync::watch;

use crate::error::Result;

mod manager;
mod model;
pub mod store;
pub mod validate;

pub use manager::SessionManager;
pub use model::{REFRESH_TOKEN_KEY, Session, SessionStatus, TOKEN_KEY, USER_KEY, User};
pub use store::{FileStore, MemoryStore, TokenStore};

/// 表单只依赖这一个会话接口
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    async fn login(&self, username: &str, password: &str) -> Result<User>;
    async fn register(&self, username: &str, password: &str, confirm_password: &str)
    -> Result<User>;
    async fn logout(&self);
    fn subscribe(&self) -> watch::Receiver<SessionStatus>;
}

impl Authenticator for SessionManager {
    async fn login(&self, username: &str, password: &str) -> Result<User> {
        SessionManager::login(self, username, password).await
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User> {
        SessionManager::register(self, username, password, confirm_password).await
    }

    async fn logout(&self) {
        SessionManager::logout(self).await
    }

    fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        SessionManager::subscribe(self)
    }
}
