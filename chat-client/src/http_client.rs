use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::api::ChatApi;
use crate::error::{ChatClientError, ChatClientResult};
use crate::models::{Ack, AuthResponse, ChatSummary, Message, Profile, ProfileUpdate, User};
use crate::token::TokenStore;
use crate::validation::{ChangePasswordForm, LoginForm, RegisterForm, UpdateProfileForm};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct ContentRequestDto<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    q: &'a str,
}

#[derive(Debug, Deserialize)]
struct EnvelopeDto<T> {
    #[serde(default)]
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct AckEnvelopeDto {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenDto {
    token: String,
}

impl From<EnvelopeDto<TokenDto>> for AuthResponse {
    fn from(value: EnvelopeDto<TokenDto>) -> Self {
        Self {
            token: value.data.token,
            message: value.message,
        }
    }
}

impl From<AckEnvelopeDto> for Ack {
    fn from(value: AckEnvelopeDto) -> Self {
        Self {
            status: value.status,
            message: value.message,
        }
    }
}

#[derive(Clone)]
/// HTTP-клиент REST API чата.
///
/// На каждый запрос читает токен из [`TokenStore`] и, если он есть,
/// добавляет заголовок `Authorization: Bearer <token>`.
pub struct HttpClient {
    base_url: String,
    client: Client,
    tokens: Arc<dyn TokenStore>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Создаёт клиент с таймаутами по умолчанию (connect 5s, request 15s).
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenStore>,
    ) -> ChatClientResult<Self> {
        Self::with_timeouts(
            base_url,
            tokens,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Создаёт клиент с явными таймаутами.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenStore>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ChatClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            tokens,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.endpoint(path));
        match self.tokens.get_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode_error(response: reqwest::Response) -> ChatClientError {
        let status = response.status();

        let message = match response.json::<ErrorResponseDto>().await {
            Ok(body) => body
                .message
                .or(body.error)
                .unwrap_or_else(|| format!("http status {status}")),
            Err(_) => format!("http status {status}"),
        };
        ChatClientError::from_http_status(status, Some(message))
    }

    /// Отправляет запрос и разбирает тело успешного ответа.
    ///
    /// Каждый сбой логируется здесь и возвращается вызывающему.
    async fn execute<T>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> ChatClientResult<T>
    where
        T: DeserializeOwned,
    {
        let result = async {
            let response = request.send().await.map_err(ChatClientError::from_reqwest)?;
            if !response.status().is_success() {
                return Err(Self::decode_error(response).await);
            }
            response
                .json::<T>()
                .await
                .map_err(ChatClientError::from_reqwest)
        }
        .await;

        match &result {
            Ok(_) => tracing::debug!(operation, "request succeeded"),
            Err(err) => tracing::error!(operation, error = %err, "request failed"),
        }
        result
    }

    async fn send_json<TReq, TRes>(
        &self,
        method: Method,
        path: &str,
        body: &TReq,
        operation: &'static str,
    ) -> ChatClientResult<TRes>
    where
        TReq: Serialize + ?Sized,
        TRes: DeserializeOwned,
    {
        let request = self.request(method, path).json(body);
        self.execute(request, operation).await
    }
}

#[async_trait]
impl ChatApi for HttpClient {
    async fn login(&self, form: &LoginForm) -> ChatClientResult<AuthResponse> {
        let dto: EnvelopeDto<TokenDto> = self
            .send_json(Method::POST, "/auth/login", form, "login")
            .await?;
        Ok(dto.into())
    }

    async fn register(&self, form: &RegisterForm) -> ChatClientResult<AuthResponse> {
        let dto: EnvelopeDto<TokenDto> = self
            .send_json(Method::POST, "/auth/register", form, "register")
            .await?;
        Ok(dto.into())
    }

    async fn profile(&self) -> ChatClientResult<Profile> {
        let dto: EnvelopeDto<Profile> = self
            .execute(self.request(Method::GET, "/auth/profile"), "profile")
            .await?;
        Ok(dto.data)
    }

    async fn update_profile(&self, form: &UpdateProfileForm) -> ChatClientResult<ProfileUpdate> {
        let dto: EnvelopeDto<ProfileUpdate> = self
            .send_json(Method::POST, "/auth/profile/update", form, "update_profile")
            .await?;
        Ok(dto.data)
    }

    async fn change_password(&self, form: &ChangePasswordForm) -> ChatClientResult<Ack> {
        let dto: AckEnvelopeDto = self
            .send_json(
                Method::POST,
                "/auth/profile/change-password",
                form,
                "change_password",
            )
            .await?;
        Ok(dto.into())
    }

    async fn chats(&self) -> ChatClientResult<Vec<ChatSummary>> {
        let dto: EnvelopeDto<Vec<ChatSummary>> = self
            .execute(self.request(Method::GET, "/chat/chats"), "chats")
            .await?;
        Ok(dto.data)
    }

    async fn messages(&self, user_id: i64) -> ChatClientResult<Vec<Message>> {
        let request = self.request(Method::GET, &format!("/chat/messages/{user_id}"));
        let dto: EnvelopeDto<Vec<Message>> = self.execute(request, "messages").await?;
        Ok(dto.data)
    }

    async fn send_message(&self, to_user_id: i64, content: &str) -> ChatClientResult<Ack> {
        let dto: AckEnvelopeDto = self
            .send_json(
                Method::POST,
                &format!("/chat/send/{to_user_id}"),
                &ContentRequestDto { content },
                "send_message",
            )
            .await?;
        Ok(dto.into())
    }

    async fn update_message(&self, message_id: i64, content: &str) -> ChatClientResult<Ack> {
        let dto: AckEnvelopeDto = self
            .send_json(
                Method::PUT,
                &format!("/chat/messages/{message_id}"),
                &ContentRequestDto { content },
                "update_message",
            )
            .await?;
        Ok(dto.into())
    }

    async fn delete_message(&self, message_id: i64) -> ChatClientResult<Ack> {
        let request = self.request(Method::DELETE, &format!("/chat/messages/{message_id}"));
        let dto: AckEnvelopeDto = self.execute(request, "delete_message").await?;
        Ok(dto.into())
    }

    async fn search_users(&self, query: &str) -> ChatClientResult<Vec<User>> {
        let request = self
            .request(Method::GET, "/users/search")
            .query(&SearchQuery { q: query });
        let dto: EnvelopeDto<Vec<User>> = self.execute(request, "search_users").await?;
        Ok(dto.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MemoryTokenStore;

    fn client(base_url: &str) -> HttpClient {
        HttpClient::new(base_url, Arc::new(MemoryTokenStore::new())).expect("client builds")
    }

    #[test]
    fn endpoint_normalizes_slashes() {
        let client = client("http://localhost:8080/");
        let full = client.endpoint("/chat/chats");
        assert_eq!(full, "http://localhost:8080/chat/chats");
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = client("https://example.com/api");
        assert_eq!(
            client.endpoint("auth/login"),
            "https://example.com/api/auth/login"
        );
    }

    #[test]
    fn auth_envelope_maps_token_and_message() {
        let raw = r#"{"status":"success","message":"Welcome","data":{"token":"a.b.c"}}"#;
        let dto: EnvelopeDto<TokenDto> = serde_json::from_str(raw).expect("parse");
        let auth = AuthResponse::from(dto);
        assert_eq!(auth.token, "a.b.c");
        assert_eq!(auth.message, "Welcome");
    }

    #[test]
    fn ack_envelope_ignores_data_shape() {
        let raw = r#"{"status":"success","message":"Deleted","data":[]}"#;
        let dto: AckEnvelopeDto = serde_json::from_str(raw).expect("parse");
        let ack = Ack::from(dto);
        assert_eq!(ack.message, "Deleted");
        assert_eq!(ack.status, "success");
    }

    #[test]
    fn envelope_requires_data_for_lists() {
        let raw = r#"{"status":"success","message":"ok"}"#;
        let parsed = serde_json::from_str::<EnvelopeDto<Vec<ChatSummary>>>(raw);
        assert!(parsed.is_err());
    }
}
