use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use crate::error::{Error, Result};

pub mod models;

use models::{
    ApiErrorBody, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
    TokenPair, TokenRequest,
};

/// 后端接口路径，相对于 API 基础地址
pub mod endpoints {
    pub const TOKEN: &str = "token/";
    pub const TOKEN_REFRESH: &str = "token/refresh/";
    pub const REGISTER: &str = "register/";
    pub const ME: &str = "me/";
    pub const PREDICT: &str = "predict/";
}

/// 对后端 REST 接口的薄封装，不持有任何会话状态
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(http: Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { http, base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    pub async fn obtain_tokens(&self, username: &str, password: &str) -> Result<TokenPair> {
        let response = self
            .request(Method::POST, endpoints::TOKEN)
            .json(&TokenRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<TokenPair>().await?);
        }

        let body = ApiErrorBody::parse(&response.bytes().await?);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(Error::Authentication(
                body.message()
                    .unwrap_or("Invalid username or password")
                    .to_string(),
            ));
        }
        Err(server_error(status, &body))
    }

    /// 用刷新令牌换取新的访问令牌；任何失败都视为会话终止
    pub async fn refresh(&self, refresh: &str) -> Result<String> {
        let response = self
            .request(Method::POST, endpoints::TOKEN_REFRESH)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.json::<RefreshResponse>().await?;
            return Ok(body.access);
        }

        let body = ApiErrorBody::parse(&response.bytes().await?);
        Err(Error::Authentication(
            body.message().unwrap_or("Session expired").to_string(),
        ))
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        password2: &str,
    ) -> Result<RegisterResponse> {
        let response = self
            .request(Method::POST, endpoints::REGISTER)
            .json(&RegisterRequest {
                username,
                password,
                password2,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<RegisterResponse>().await?);
        }

        let body = ApiErrorBody::parse(&response.bytes().await?);
        if status.is_server_error() {
            return Err(server_error(status, &body));
        }
        Err(Error::Registration {
            message: body.message().unwrap_or("Request failed").to_string(),
            reasons: body.reasons.unwrap_or_default(),
        })
    }
}

/// 将非成功响应转换为错误
pub async fn error_from(response: Response) -> Error {
    let status = response.status();
    match response.bytes().await {
        Ok(bytes) => server_error(status, &ApiErrorBody::parse(&bytes)),
        Err(e) => Error::from(e),
    }
}

fn server_error(status: StatusCode, body: &ApiErrorBody) -> Error {
    let message = body
        .message()
        .or(status.canonical_reason())
        .unwrap_or("request failed")
        .to_string();
    Error::Server {
        status: status.as_u16(),
        message,
    }
}
