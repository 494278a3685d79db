//! Клиентская библиотека чата поверх REST API.
//!
//! `ChatClient` объединяет:
//! - хранилище JWT ([`TokenStore`]) с клиентской проверкой срока действия;
//! - HTTP-клиент ([`HttpClient`]), который подставляет bearer-токен;
//! - кэш серверного состояния ([`QueryCache`]) с инвалидацией после мутаций;
//! - поллеры ([`PollHandle`]) для открытой переписки и списка чатов;
//! - поиск пользователей с кэшем по строке запроса.
//!
//! Все зависимости внедряются явно, поэтому в тестах подменяются фейками.
#![warn(missing_docs)]

mod api;
mod cache;
mod compose;
mod date;
mod error;
mod http_client;
mod models;
mod search;
mod settings;
mod sync;
mod token;
mod validation;

pub use api::ChatApi;
pub use cache::{
    CacheEvent, Cacheable, ObserverGuard, QueryCache, QueryData, QueryError, QueryKey, QueryState,
};
pub use compose::{ComposeMode, ComposeState, KeyPress, Submission};
pub use date::format_date;
pub use error::{ChatClientError, ChatClientResult};
pub use http_client::HttpClient;
pub use models::{
    Ack, AuthResponse, ChatSummary, Contact, Message, Profile, ProfileUpdate, User, filter_chats,
    find_chat,
};
pub use search::UserSearch;
pub use settings::ClientSettings;
pub use sync::{CHATS_POLL_INTERVAL, CONVERSATION_POLL_INTERVAL, PollHandle, spawn_poller};
pub use token::{
    Claims, FileTokenStore, MemoryTokenStore, TokenStore, decode_claims, is_token_expired,
    is_token_expired_at,
};
pub use validation::{
    ChangePasswordForm, LoginForm, RegisterForm, UpdateProfileForm, field_messages,
};

use std::sync::Arc;
use std::time::Duration;

use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Действующая сессия: токен прошёл клиентскую проверку срока.
pub struct Session {
    /// JWT.
    pub token: String,
    /// Идентификатор текущего пользователя из claim `id`.
    pub user_id: Option<i64>,
}

#[derive(Clone)]
/// Клиент чата: авторизация, переписки, профиль, поиск.
pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    tokens: Arc<dyn TokenStore>,
    cache: Arc<QueryCache>,
    search: UserSearch,
    messages_poll_interval: Duration,
    chats_poll_interval: Duration,
}

impl ChatClient {
    /// Собирает клиент из внедрённых зависимостей.
    pub fn new(
        api: Arc<dyn ChatApi>,
        tokens: Arc<dyn TokenStore>,
        cache: Arc<QueryCache>,
        settings: &ClientSettings,
    ) -> Self {
        let search = UserSearch::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            settings.search_stale_time,
            settings.search_gc_time,
        );
        Self {
            api,
            tokens,
            cache,
            search,
            messages_poll_interval: settings.messages_poll_interval,
            chats_poll_interval: settings.chats_poll_interval,
        }
    }

    /// Клиент поверх HTTP с токеном в файле из настроек.
    pub fn from_settings(settings: &ClientSettings) -> ChatClientResult<Self> {
        let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&settings.token_file));
        let api = HttpClient::with_timeouts(
            settings.api_url.clone(),
            Arc::clone(&tokens),
            settings.connect_timeout,
            settings.request_timeout,
        )?;
        Ok(Self::new(
            Arc::new(api),
            tokens,
            Arc::new(QueryCache::new()),
            settings,
        ))
    }

    /// Кэш серверного состояния.
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Хранилище токена.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Проверка перед любой защищённой операцией.
    ///
    /// Если токена нет или он истёк, токен удаляется, кэш очищается,
    /// возвращается [`ChatClientError::Unauthorized`].
    pub fn session(&self) -> ChatClientResult<Session> {
        let Some(token) = self.tokens.get_token() else {
            return Err(ChatClientError::Unauthorized);
        };

        if is_token_expired(&token) {
            tracing::info!("stored token expired, signing out");
            self.tokens.remove_token()?;
            self.cache.clear();
            return Err(ChatClientError::Unauthorized);
        }

        let user_id = decode_claims(&token).and_then(|claims| claims.id);
        Ok(Session { token, user_id })
    }

    /// Идентификатор текущего пользователя.
    pub fn current_user_id(&self) -> ChatClientResult<i64> {
        self.session()?.user_id.ok_or_else(|| {
            ChatClientError::InvalidRequest("token carries no user id".to_string())
        })
    }

    /// Вход. Токен из ответа сохраняется в хранилище.
    pub async fn login(&self, username: &str, password: &str) -> ChatClientResult<AuthResponse> {
        let form = LoginForm {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        form.validate()?;

        let auth = self.api.login(&form).await?;
        self.tokens.set_token(&auth.token)?;
        tracing::info!(username = %form.username, "logged in");
        Ok(auth)
    }

    /// Регистрация. Токен из ответа сохраняется в хранилище.
    pub async fn register(&self, form: RegisterForm) -> ChatClientResult<AuthResponse> {
        let form = RegisterForm {
            username: form.username.trim().to_string(),
            ..form
        };
        form.validate()?;

        let auth = self.api.register(&form).await?;
        self.tokens.set_token(&auth.token)?;
        tracing::info!(username = %form.username, "registered");
        Ok(auth)
    }

    /// Выход: токен удаляется, кэш очищается.
    pub fn logout(&self) -> ChatClientResult<()> {
        self.tokens.remove_token()?;
        self.cache.clear();
        tracing::info!("logged out");
        Ok(())
    }

    /// Профиль текущего пользователя.
    pub async fn profile(&self) -> ChatClientResult<Profile> {
        self.session()?;
        let api = Arc::clone(&self.api);
        self.cache
            .fetch_with(QueryKey::Profile, Duration::ZERO, || async move {
                api.profile().await
            })
            .await
    }

    /// Обновляет профиль; кэш профиля инвалидируется.
    pub async fn update_profile(
        &self,
        form: UpdateProfileForm,
    ) -> ChatClientResult<ProfileUpdate> {
        form.validate()?;
        self.session()?;

        let profile = self.api.update_profile(&form).await?;
        self.cache.invalidate(&QueryKey::Profile);
        Ok(profile)
    }

    /// Меняет пароль.
    pub async fn change_password(&self, form: ChangePasswordForm) -> ChatClientResult<Ack> {
        form.validate()?;
        self.session()?;
        self.api.change_password(&form).await
    }

    /// Список чатов (всегда свежий запрос, результат кладётся в кэш).
    pub async fn chats(&self) -> ChatClientResult<Vec<ChatSummary>> {
        self.session()?;
        let api = Arc::clone(&self.api);
        self.cache
            .fetch_with(QueryKey::Chats, Duration::ZERO, || async move { api.chats().await })
            .await
    }

    /// Сообщения переписки с `user_id` в порядке сервера.
    pub async fn messages(&self, user_id: i64) -> ChatClientResult<Vec<Message>> {
        self.session()?;
        let api = Arc::clone(&self.api);
        self.cache
            .fetch_with(
                QueryKey::Conversation(user_id),
                Duration::ZERO,
                || async move { api.messages(user_id).await },
            )
            .await
    }

    /// Отправляет сообщение и инвалидирует переписку.
    pub async fn send_message(&self, to_user_id: i64, content: &str) -> ChatClientResult<Ack> {
        self.session()?;
        let ack = self.api.send_message(to_user_id, content).await?;
        self.cache.invalidate(&QueryKey::Conversation(to_user_id));
        Ok(ack)
    }

    /// Правит сообщение в переписке с `conversation_user_id` и инвалидирует её.
    pub async fn update_message(
        &self,
        conversation_user_id: i64,
        message_id: i64,
        content: &str,
    ) -> ChatClientResult<Ack> {
        self.session()?;
        let ack = self.api.update_message(message_id, content).await?;
        self.cache.invalidate(&QueryKey::Conversation(conversation_user_id));
        Ok(ack)
    }

    /// Удаляет сообщение в переписке с `conversation_user_id` и инвалидирует её.
    pub async fn delete_message(
        &self,
        conversation_user_id: i64,
        message_id: i64,
    ) -> ChatClientResult<Ack> {
        self.session()?;
        let ack = self.api.delete_message(message_id).await?;
        self.cache.invalidate(&QueryKey::Conversation(conversation_user_id));
        Ok(ack)
    }

    /// Отправляет черновик: новое сообщение или правку, в зависимости от режима.
    ///
    /// `Ok(None)`: submit недоступен (пустой текст или запрос уже в полёте).
    pub async fn submit(
        &self,
        compose: &mut ComposeState,
        conversation_user_id: i64,
    ) -> ChatClientResult<Option<Ack>> {
        let Some(submission) = compose.begin_submit(conversation_user_id) else {
            return Ok(None);
        };

        let result = match &submission {
            Submission::Send {
                to_user_id,
                content,
            } => self.send_message(*to_user_id, content).await,
            Submission::Update {
                message_id,
                content,
            } => {
                self.update_message(conversation_user_id, *message_id, content)
                    .await
            }
        };

        compose.finish_submit(result.is_ok());
        result.map(Some)
    }

    /// Поиск пользователей, см. [`UserSearch::search`].
    pub async fn search_users(&self, query: &str) -> ChatClientResult<Vec<User>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.session()?;
        self.search.search(query).await
    }

    /// Запускает опрос переписки с `user_id`; данные появляются в кэше по
    /// ключу [`QueryKey::Conversation`].
    pub fn watch_conversation(&self, user_id: i64) -> ChatClientResult<PollHandle> {
        self.session()?;
        let api = Arc::clone(&self.api);
        Ok(spawn_poller(
            Arc::clone(&self.cache),
            QueryKey::Conversation(user_id),
            self.messages_poll_interval,
            move || {
                let api = Arc::clone(&api);
                async move { api.messages(user_id).await }
            },
        ))
    }

    /// Запускает опрос списка чатов; данные в кэше по ключу [`QueryKey::Chats`].
    pub fn watch_chats(&self) -> ChatClientResult<PollHandle> {
        self.session()?;
        let api = Arc::clone(&self.api);
        Ok(spawn_poller(
            Arc::clone(&self.cache),
            QueryKey::Chats,
            self.chats_poll_interval,
            move || {
                let api = Arc::clone(&api);
                async move { api.chats().await }
            },
        ))
    }
}
