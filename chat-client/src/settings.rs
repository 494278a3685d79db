use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

/// Настройки клиента из переменных окружения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Базовый URL REST API (`CHAT_API_URL`).
    pub api_url: String,
    /// Файл с токеном (`CHAT_TOKEN_FILE`).
    pub token_file: PathBuf,
    /// Период опроса переписки (`CHAT_MESSAGES_POLL_MS`).
    pub messages_poll_interval: Duration,
    /// Период опроса списка чатов (`CHAT_CHATS_POLL_MS`).
    pub chats_poll_interval: Duration,
    /// Сколько результаты поиска считаются свежими (`CHAT_SEARCH_STALE_SECS`).
    pub search_stale_time: Duration,
    /// Через сколько неиспользуемые результаты поиска удаляются (`CHAT_SEARCH_GC_SECS`).
    pub search_gc_time: Duration,
    /// `CHAT_CONNECT_TIMEOUT_SECS`.
    pub connect_timeout: Duration,
    /// `CHAT_REQUEST_TIMEOUT_SECS`.
    pub request_timeout: Duration,
    /// Уровень логирования (`LOG_LEVEL`, затем `RUST_LOG`).
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            token_file: PathBuf::from(".chat_token"),
            messages_poll_interval: Duration::from_millis(4000),
            chats_poll_interval: Duration::from_millis(10_000),
            search_stale_time: Duration::from_secs(5 * 60),
            search_gc_time: Duration::from_secs(10 * 60),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            log_level: "info".to_string(),
        }
    }
}

impl ClientSettings {
    /// Читает настройки из окружения процесса.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Читает настройки через произвольный источник значений.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_url = lookup("CHAT_API_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_url);
        let token_file = lookup("CHAT_TOKEN_FILE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.token_file);
        let log_level = lookup("LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or(defaults.log_level);

        Ok(Self {
            api_url,
            token_file,
            messages_poll_interval: Duration::from_millis(parse_u64(
                &lookup,
                "CHAT_MESSAGES_POLL_MS",
                4000,
            )?),
            chats_poll_interval: Duration::from_millis(parse_u64(
                &lookup,
                "CHAT_CHATS_POLL_MS",
                10_000,
            )?),
            search_stale_time: Duration::from_secs(parse_u64(
                &lookup,
                "CHAT_SEARCH_STALE_SECS",
                300,
            )?),
            search_gc_time: Duration::from_secs(parse_u64(&lookup, "CHAT_SEARCH_GC_SECS", 600)?),
            connect_timeout: Duration::from_secs(parse_u64(
                &lookup,
                "CHAT_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            request_timeout: Duration::from_secs(parse_u64(
                &lookup,
                "CHAT_REQUEST_TIMEOUT_SECS",
                15,
            )?),
            log_level,
        })
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    let value = lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let settings = ClientSettings::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(settings.messages_poll_interval, Duration::from_secs(4));
        assert_eq!(settings.chats_poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let settings = ClientSettings::from_lookup(lookup(&[
            ("CHAT_API_URL", " https://chat.example.com "),
            ("CHAT_MESSAGES_POLL_MS", "1500"),
            ("CHAT_TOKEN_FILE", "/tmp/token"),
            ("RUST_LOG", "debug"),
        ]))
        .expect("settings");

        assert_eq!(settings.api_url, "https://chat.example.com");
        assert_eq!(settings.messages_poll_interval, Duration::from_millis(1500));
        assert_eq!(settings.token_file, PathBuf::from("/tmp/token"));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = ClientSettings::from_lookup(lookup(&[("CHAT_CHATS_POLL_MS", "0")]))
            .expect_err("must fail");
        assert!(err.to_string().contains("CHAT_CHATS_POLL_MS"));
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        assert!(
            ClientSettings::from_lookup(lookup(&[("CHAT_SEARCH_GC_SECS", "ten")])).is_err()
        );
    }
}
