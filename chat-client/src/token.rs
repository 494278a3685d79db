//! Хранение JWT на клиенте и проверка срока его действия.
//!
//! Сервер не хранит сессий: единственным состоянием авторизации остаётся токен,
//! срок которого клиент проверяет сам по claim `exp`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::ChatClientResult;

/// Хранилище токена. Внедряется в клиент, поэтому в тестах подменяется
/// на [`MemoryTokenStore`].
pub trait TokenStore: Send + Sync {
    /// Возвращает сохранённый токен, если он есть.
    fn get_token(&self) -> Option<String>;
    /// Сохраняет токен.
    fn set_token(&self, token: &str) -> ChatClientResult<()>;
    /// Удаляет токен.
    fn remove_token(&self) -> ChatClientResult<()>;
}

#[derive(Debug, Default)]
/// Токен в памяти процесса.
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    /// Хранилище с заранее известным токеном.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(parse_token_content(&token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: &str) -> ChatClientResult<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = parse_token_content(token);
        Ok(())
    }

    fn remove_token(&self) -> ChatClientResult<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Токен в файле (по умолчанию `.chat_token` в рабочем каталоге).
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Хранилище поверх файла `path`. Файл создаётся при первом `set_token`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Путь к файлу токена.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> io::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(parse_token_content(&raw))
    }
}

impl TokenStore for FileTokenStore {
    fn get_token(&self) -> Option<String> {
        match self.load() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read token file"
                );
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> ChatClientResult<()> {
        fs::write(&self.path, token.trim())?;
        Ok(())
    }

    fn remove_token(&self) -> ChatClientResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn parse_token_content(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Claims, которые клиент читает из payload токена.
pub struct Claims {
    /// Идентификатор текущего пользователя.
    #[serde(default)]
    pub id: Option<i64>,
    /// Логин, если сервер его кладёт в токен.
    #[serde(default)]
    pub username: Option<String>,
    /// Время истечения, unix-секунды. NumericDate может быть дробным.
    pub exp: f64,
}

/// Декодирует payload JWT без проверки подписи.
///
/// Подпись проверяет сервер; клиенту нужны только `exp` и `id`.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()
}

/// Токен истёк, если `exp` меньше `now_unix`. Нечитаемый токен считается истёкшим.
pub fn is_token_expired_at(token: &str, now_unix: i64) -> bool {
    match decode_claims(token) {
        Some(claims) => claims.exp < now_unix as f64,
        None => {
            tracing::debug!("invalid jwt token, treating as expired");
            true
        }
    }
}

/// [`is_token_expired_at`] относительно текущего времени.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, chrono::Utc::now().timestamp())
}
