use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `chat-client`.
pub enum ChatClientError {
    /// Ошибка HTTP-транспорта (`reqwest`): сеть, таймаут, разбор JSON.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Требуется авторизация: токен отсутствует, истёк или отвергнут сервером.
    #[error("unauthorized")]
    Unauthorized,

    /// Запрошенный ресурс не найден.
    #[error("not found")]
    NotFound,

    /// Сервер ответил не-2xx статусом.
    #[error("api error {status}: {message}")]
    Api {
        /// HTTP-статус ответа.
        status: u16,
        /// Сообщение из тела ответа или `http status N`.
        message: String,
    },

    /// Некорректный запрос, отклонённый ещё на стороне клиента.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Данные формы не прошли валидацию.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Ошибка локального хранилища токена.
    #[error("token storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Результат операций `chat-client`.
pub type ChatClientResult<T> = Result<T, ChatClientError>;

impl ChatClientError {
    pub(crate) fn from_http_status(status: reqwest::StatusCode, message: Option<String>) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Self::Unauthorized
            }
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            _ => Self::Api {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| format!("http status {status}")),
            },
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None);
        }
        Self::Http(err)
    }

    /// Ошибку авторизации нужно обрабатывать переходом на вход.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn forbidden_maps_to_unauthorized() {
        let err = ChatClientError::from_http_status(StatusCode::FORBIDDEN, None);
        assert!(err.is_unauthorized());
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = ChatClientError::from_http_status(StatusCode::NOT_FOUND, Some("gone".into()));
        assert!(matches!(err, ChatClientError::NotFound));
    }

    #[test]
    fn other_status_keeps_server_message() {
        let err = ChatClientError::from_http_status(
            StatusCode::CONFLICT,
            Some("username taken".to_string()),
        );
        match err {
            ChatClientError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "username taken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_message_falls_back_to_status_text() {
        let err = ChatClientError::from_http_status(StatusCode::BAD_GATEWAY, None);
        assert_eq!(err.to_string(), "api error 502: http status 502 Bad Gateway");
    }
}
