use thiserror::Error;

/// 本地输入校验失败，不会发出任何网络请求
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username is required")]
    MissingUsername,
    #[error("Password is required")]
    MissingPassword,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("Password cannot be entirely numeric")]
    PasswordNumeric,
    #[error("Password is too similar to the username")]
    PasswordSimilarToUsername,
    #[error("Enter a valid http(s) URL")]
    InvalidUrl,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Authentication(String),
    #[error("{}", registration_message(.message, .reasons))]
    Registration {
        message: String,
        reasons: Vec<String>,
    },
    #[error("{0}")]
    Network(String),
    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },
    #[error("token storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

fn registration_message(message: &str, reasons: &[String]) -> String {
    if reasons.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", message, reasons.join(", "))
    }
}
