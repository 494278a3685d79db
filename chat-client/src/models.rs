use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Пользователь из результатов поиска.
pub struct User {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Логин.
    pub username: String,
    /// Полное имя.
    pub fullname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Профиль текущего пользователя.
pub struct Profile {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Логин.
    pub username: String,
    /// Полное имя.
    pub fullname: String,
    /// Email.
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Профиль после обновления. Сервер возвращает его без `id`.
pub struct ProfileUpdate {
    /// Логин.
    pub username: String,
    /// Полное имя.
    pub fullname: String,
    /// Email.
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Строка списка чатов: собеседник и последнее сообщение.
///
/// `id` здесь означает идентификатор собеседника, он же ключ переписки.
pub struct ChatSummary {
    /// Идентификатор собеседника.
    pub id: i64,
    /// Логин собеседника.
    pub username: String,
    /// Полное имя собеседника.
    pub fullname: String,
    /// Текст последнего сообщения.
    pub last_message: String,
    /// Дата последнего сообщения в том виде, в каком её прислал сервер.
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Сообщение переписки.
pub struct Message {
    /// Идентификатор сообщения.
    pub id: i64,
    /// Автор.
    pub from_user_id: i64,
    /// Получатель.
    pub to_user_id: i64,
    /// Текст.
    pub content: String,
    /// Дата отправки в том виде, в каком её прислал сервер.
    pub date: String,
}

impl Message {
    /// Сообщение написано пользователем `user_id`.
    pub fn is_authored_by(&self, user_id: i64) -> bool {
        self.from_user_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ответ сервера на мутацию, у которой нет полезных данных.
pub struct Ack {
    /// Статус из конверта ответа.
    pub status: String,
    /// Сообщение сервера для пользователя.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ответ после успешной регистрации или входа.
pub struct AuthResponse {
    /// JWT access token.
    pub token: String,
    /// Сообщение сервера для пользователя.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Элемент списка контактов: строка списка чатов или найденный пользователь.
pub enum Contact {
    /// Существующая переписка.
    Chat(ChatSummary),
    /// Пользователь из поиска, переписки с ним может ещё не быть.
    User(User),
}

impl Contact {
    /// Идентификатор собеседника, по нему открывается переписка.
    pub fn user_id(&self) -> i64 {
        match self {
            Self::Chat(chat) => chat.id,
            Self::User(user) => user.id,
        }
    }

    /// Полное имя.
    pub fn fullname(&self) -> &str {
        match self {
            Self::Chat(chat) => &chat.fullname,
            Self::User(user) => &user.fullname,
        }
    }

    /// Логин.
    pub fn username(&self) -> &str {
        match self {
            Self::Chat(chat) => &chat.username,
            Self::User(user) => &user.username,
        }
    }

    /// Заглавная буква имени для аватарки.
    pub fn initial(&self) -> Option<char> {
        self.fullname()
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
    }

    /// Вторая строка: последнее сообщение для чата, `@username` для пользователя.
    pub fn subtitle(&self) -> String {
        match self {
            Self::Chat(chat) => chat.last_message.clone(),
            Self::User(user) => format!("@{}", user.username),
        }
    }
}

impl From<ChatSummary> for Contact {
    fn from(value: ChatSummary) -> Self {
        Self::Chat(value)
    }
}

impl From<User> for Contact {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

/// Оставляет чаты, в полном имени которых встречается `needle` (без учёта регистра).
pub fn filter_chats<'a>(chats: &'a [ChatSummary], needle: &str) -> Vec<&'a ChatSummary> {
    let needle = needle.trim().to_lowercase();
    chats
        .iter()
        .filter(|chat| chat.fullname.to_lowercase().contains(&needle))
        .collect()
}

/// Ищет чат с собеседником `user_id`.
pub fn find_chat(chats: &[ChatSummary], user_id: i64) -> Option<&ChatSummary> {
    chats.iter().find(|chat| chat.id == user_id)
}
