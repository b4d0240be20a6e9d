//! 表单边界：所有错误在这里转换为表单旁显示的提示文本，不再向上抛出。

use crate::check::UrlChecker;
use crate::error::Error;
use crate::session::Authenticator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Success(String),
    Error(String),
}

impl FormOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FormOutcome::Success(_))
    }

    pub fn message(&self) -> &str {
        match self {
            FormOutcome::Success(message) | FormOutcome::Error(message) => message,
        }
    }
}

/// 错误对应的表单提示
pub fn inline_message(err: &Error) -> String {
    match err {
        Error::Server { message, .. } => message.clone(),
        Error::Storage(_) => "Could not save your session on this device".to_string(),
        other => other.to_string(),
    }
}

pub async fn submit_login<A: Authenticator>(auth: &A, username: &str, password: &str) -> FormOutcome {
    match auth.login(username, password).await {
        Ok(user) => FormOutcome::Success(format!("Signed in as {}", user.username)),
        Err(e) => {
            tracing::debug!("Login form rejected: {}", e);
            FormOutcome::Error(inline_message(&e))
        }
    }
}

pub async fn submit_register<A: Authenticator>(
    auth: &A,
    username: &str,
    password: &str,
    confirm_password: &str,
) -> FormOutcome {
    match auth.register(username, password, confirm_password).await {
        Ok(user) => FormOutcome::Success(format!("Account created, signed in as {}", user.username)),
        Err(e) => {
            tracing::debug!("Register form rejected: {}", e);
            FormOutcome::Error(inline_message(&e))
        }
    }
}

pub async fn submit_logout<A: Authenticator>(auth: &A) -> FormOutcome {
    auth.logout().await;
    FormOutcome::Success("Signed out".to_string())
}

pub async fn submit_check(checker: &mut UrlChecker, url: &str) -> FormOutcome {
    match checker.check(url).await {
        Ok(record) => {
            let verdict = record.verdict();
            match record.prediction.score() {
                Some(score) => FormOutcome::Success(format!("{} ({:.2})", verdict, score)),
                None => FormOutcome::Success(verdict.to_string()),
            }
        }
        Err(e) => FormOutcome::Error(inline_message(&e)),
    }
}
