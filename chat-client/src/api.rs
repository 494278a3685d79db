use async_trait::async_trait;

use crate::error::ChatClientResult;
use crate::models::{Ack, AuthResponse, ChatSummary, Message, Profile, ProfileUpdate, User};
use crate::validation::{ChangePasswordForm, LoginForm, RegisterForm, UpdateProfileForm};

/// Операции REST API чата.
///
/// Основная реализация: [`crate::HttpClient`]; в тестах подменяется фейком.
/// Любой сбой возвращается как ошибка, пустые списки на ошибке не подставляются.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, form: &LoginForm) -> ChatClientResult<AuthResponse>;

    /// `POST /auth/register`.
    async fn register(&self, form: &RegisterForm) -> ChatClientResult<AuthResponse>;

    /// `GET /auth/profile`.
    async fn profile(&self) -> ChatClientResult<Profile>;

    /// `POST /auth/profile/update`. В ответе нет `id`.
    async fn update_profile(&self, form: &UpdateProfileForm) -> ChatClientResult<ProfileUpdate>;

    /// `POST /auth/profile/change-password`.
    async fn change_password(&self, form: &ChangePasswordForm) -> ChatClientResult<Ack>;

    /// `GET /chat/chats`.
    async fn chats(&self) -> ChatClientResult<Vec<ChatSummary>>;

    /// `GET /chat/messages/{user_id}`: переписка с собеседником `user_id`.
    async fn messages(&self, user_id: i64) -> ChatClientResult<Vec<Message>>;

    /// `POST /chat/send/{to_user_id}`.
    async fn send_message(&self, to_user_id: i64, content: &str) -> ChatClientResult<Ack>;

    /// `PUT /chat/messages/{message_id}`.
    async fn update_message(&self, message_id: i64, content: &str) -> ChatClientResult<Ack>;

    /// `DELETE /chat/messages/{message_id}`.
    async fn delete_message(&self, message_id: i64) -> ChatClientResult<Ack>;

    /// `GET /users/search?q=`.
    async fn search_users(&self, query: &str) -> ChatClientResult<Vec<User>>;
}
