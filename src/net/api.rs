//! HTTP plumbing for the identity API.
//!
//! DESIGN
//! ======
//! `build_request` produces the option object shared by every call, the
//! [`Transport`] trait performs the exchange, and [`ApiClient`] maps each
//! endpoint onto typed bodies and replies. Replies are judged by their `ok`
//! field rather than the HTTP status, so a 400 carrying `{ok:false,error}`
//! still surfaces the server's message.
//!
//! ERROR HANDLING
//! ==============
//! No retries and no request timeout. A call that cannot produce a JSON
//! object comes back as [`ApiError::Transport`]; callers decide what the user
//! sees.

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{
    ApiError, DeleteAccountBody, FlagBody, LoginBody, MessageReply, PasswordBody, Person, ProfileReply,
    ProfileUpdate, RegistrationBody, ResetPasswordBody, ResetRequestBody, TokenReply, parse_reply,
};
use crate::config::ConsoleConfig;

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Cross-origin mode of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Cors,
    NoCors,
    SameOrigin,
}

/// Whether cookies and HTTP auth travel with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsPolicy {
    Omit,
    SameOrigin,
    Include,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Default,
    NoCache,
}

/// Everything about a request except its URL and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: Method,
    pub mode: RequestMode,
    pub credentials: CredentialsPolicy,
    pub cache: CachePolicy,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Build the options shared by every identity API call.
///
/// JSON content negotiation is always set; `key_header` is added only when
/// an API key is supplied.
#[must_use]
pub fn build_request(method: Method, key_header: &str, api_key: Option<&str>) -> RequestOptions {
    let mut headers = vec![
        ("Content-Type".to_owned(), "application/json".to_owned()),
        ("Accept".to_owned(), "application/json".to_owned()),
    ];
    if let Some(key) = api_key {
        headers.push((key_header.to_owned(), key.to_owned()));
    }
    RequestOptions {
        method,
        mode: RequestMode::Cors,
        credentials: CredentialsPolicy::SameOrigin,
        cache: CachePolicy::NoCache,
        headers,
    }
}

/// A fully assembled request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub options: RequestOptions,
    pub body: Option<Value>,
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request and return the decoded JSON reply.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the request fails or the reply is
    /// not JSON.
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let ApiRequest { url, options, body } = request;
        // mode and credentials only mean something inside a browser.
        tracing::trace!(
            method = options.method.as_str(),
            %url,
            mode = ?options.mode,
            credentials = ?options.credentials,
            "sending identity request"
        );

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidHeader { header: name.clone() })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader { header: name.clone() })?;
            headers.insert(header_name, header_value);
        }
        if options.cache == CachePolicy::NoCache {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }

        let mut builder = self.http.request(options.method.into(), &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| ApiError::Transport(format!("status {status}: {e}")))
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Typed access to the identity API endpoints.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    key_header: String,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(base_url: &str, key_header: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: crate::config::normalize_api_url(base_url),
            key_header: key_header.to_owned(),
            transport,
        }
    }

    /// Build a client with the `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.connect_timeout)?;
        Ok(Self::new(&config.api_url, &config.api_key_header, Arc::new(transport)))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[must_use]
    pub fn build_request(&self, method: Method, api_key: Option<&str>) -> RequestOptions {
        build_request(method, &self.key_header, api_key)
    }

    async fn call<B, R>(&self, method: Method, path: &str, api_key: Option<&str>, body: Option<&B>) -> Result<R, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::Transport(format!("request encode failed: {e}")))?;
        let request = ApiRequest { url: self.endpoint(path), options: self.build_request(method, api_key), body };
        let reply = self.transport.send(request).await?;
        parse_reply(reply)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str, api_key: &str) -> Result<R, ApiError> {
        self.call::<Value, R>(Method::Get, path, Some(api_key), None).await
    }

    /// `POST /user/login`: exchange credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let reply: TokenReply = self
            .call(Method::Post, "/user/login", None, Some(&LoginBody { email, password }))
            .await?;
        non_empty_token(reply)
    }

    /// `POST /user/registration`: create an account. Returns the server's
    /// confirmation message, if any.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn register(&self, email: &str, password: &str, confirm_password: &str) -> Result<Option<String>, ApiError> {
        let body = RegistrationBody { email, password, confirm_password };
        let reply: MessageReply = self.call(Method::Post, "/user/registration", None, Some(&body)).await?;
        Ok(reply.message)
    }

    /// `GET /user/profile`.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn profile(&self, token: &str) -> Result<Person, ApiError> {
        let reply: ProfileReply = self.get("/user/profile", token).await?;
        Ok(reply.person)
    }

    /// `GET /user/token`: trade the current token for a renewed one.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn refresh_token(&self, token: &str) -> Result<String, ApiError> {
        let reply: TokenReply = self.get("/user/token", token).await?;
        non_empty_token(reply)
    }

    /// `PUT /user/update`.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn update_profile(&self, token: &str, update: &ProfileUpdate<'_>) -> Result<(), ApiError> {
        let _: MessageReply = self.call(Method::Put, "/user/update", Some(token), Some(update)).await?;
        Ok(())
    }

    /// `PUT /user/password`.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn change_password(&self, token: &str, password: &str, confirm_password: &str) -> Result<Option<String>, ApiError> {
        let body = PasswordBody { password, confirm_password };
        let reply: MessageReply = self.call(Method::Put, "/user/password", Some(token), Some(&body)).await?;
        Ok(reply.message)
    }

    /// `PUT /user/flag/add`.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn add_flag(&self, token: &str, flag: &str) -> Result<(), ApiError> {
        let _: MessageReply = self.call(Method::Put, "/user/flag/add", Some(token), Some(&FlagBody { flag })).await?;
        Ok(())
    }

    /// `DELETE /user/flag/remove`.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn remove_flag(&self, token: &str, flag: &str) -> Result<(), ApiError> {
        let _: MessageReply = self
            .call(Method::Delete, "/user/flag/remove", Some(token), Some(&FlagBody { flag }))
            .await?;
        Ok(())
    }

    /// `DELETE /user/delete`: permanently remove the account.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn delete_account(&self, token: &str, password: &str) -> Result<(), ApiError> {
        let body = DeleteAccountBody { password, delete_confirmed: true };
        let _: MessageReply = self.call(Method::Delete, "/user/delete", Some(token), Some(&body)).await?;
        Ok(())
    }

    /// `POST /user/forgotten_pwd`: ask the server to mail a reset token.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn request_password_reset(&self, id: &str) -> Result<Option<String>, ApiError> {
        let reply: MessageReply = self
            .call(Method::Post, "/user/forgotten_pwd", None, Some(&ResetRequestBody { id }))
            .await?;
        Ok(reply.message)
    }

    /// `POST /user/change_forgotten_pwd`: set a new password with a mailed
    /// reset token.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Option<String>, ApiError> {
        let body = ResetPasswordBody { token_forgotten_pwd: reset_token, password, confirm_password };
        let reply: MessageReply = self.call(Method::Post, "/user/change_forgotten_pwd", None, Some(&body)).await?;
        Ok(reply.message)
    }
}

fn non_empty_token(reply: TokenReply) -> Result<String, ApiError> {
    if reply.token.trim().is_empty() {
        return Err(ApiError::Transport("malformed reply: empty token".to_owned()));
    }
    Ok(reply.token)
}
