use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn login(username: &str, password: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::MissingUsername);
    }
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    Ok(())
}

/// 注册前的本地校验，顺序与表单提示一致
pub fn registration(
    username: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::MissingUsername);
    }
    if password != confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordNumeric);
    }
    if username.to_lowercase().contains(&password.to_lowercase()) {
        return Err(ValidationError::PasswordSimilarToUsername);
    }
    Ok(())
}
