//! Кэш серверного состояния с ключами по запросам.
//!
//! Значение по ключу всегда заменяется целиком. Ошибка загрузки не стирает
//! уже показанные данные. Изменения рассылаются подписчикам через
//! [`CacheEvent`]: так поллеры узнают об инвалидации, а представление о
//! свежих данных.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{ChatClientError, ChatClientResult};
use crate::models::{ChatSummary, Message, Profile, User};

const EVENTS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Ключ кэша.
pub enum QueryKey {
    /// Список чатов.
    Chats,
    /// Переписка с собеседником.
    Conversation(i64),
    /// Профиль текущего пользователя.
    Profile,
    /// Результаты поиска по строке.
    Users(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Значение, лежащее в кэше.
pub enum QueryData {
    /// Список чатов.
    Chats(Vec<ChatSummary>),
    /// Сообщения переписки в порядке сервера.
    Messages(Vec<Message>),
    /// Профиль.
    Profile(Profile),
    /// Найденные пользователи.
    Users(Vec<User>),
}

/// Типы, которые можно положить в кэш.
pub trait Cacheable: Clone + Send + 'static {
    /// Упаковывает значение.
    fn into_data(self) -> QueryData;
    /// Достаёт значение, если тип совпадает.
    fn from_data(data: &QueryData) -> Option<Self>;
}

impl Cacheable for Vec<ChatSummary> {
    fn into_data(self) -> QueryData {
        QueryData::Chats(self)
    }

    fn from_data(data: &QueryData) -> Option<Self> {
        match data {
            QueryData::Chats(chats) => Some(chats.clone()),
            _ => None,
        }
    }
}

impl Cacheable for Vec<Message> {
    fn into_data(self) -> QueryData {
        QueryData::Messages(self)
    }

    fn from_data(data: &QueryData) -> Option<Self> {
        match data {
            QueryData::Messages(messages) => Some(messages.clone()),
            _ => None,
        }
    }
}

impl Cacheable for Profile {
    fn into_data(self) -> QueryData {
        QueryData::Profile(self)
    }

    fn from_data(data: &QueryData) -> Option<Self> {
        match data {
            QueryData::Profile(profile) => Some(profile.clone()),
            _ => None,
        }
    }
}

impl Cacheable for Vec<User> {
    fn into_data(self) -> QueryData {
        QueryData::Users(self)
    }

    fn from_data(data: &QueryData) -> Option<Self> {
        match data {
            QueryData::Users(users) => Some(users.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Событие кэша.
pub enum CacheEvent {
    /// По ключу записаны свежие данные.
    Updated(QueryKey),
    /// Загрузка по ключу завершилась ошибкой.
    Failed(QueryKey),
    /// Ключ инвалидирован и должен быть перезагружен.
    Invalidated(QueryKey),
    /// Кэш очищен целиком (выход из аккаунта).
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Последняя ошибка загрузки по ключу.
pub struct QueryError {
    /// Текст ошибки.
    pub message: String,
    /// Ошибка авторизации: представлению нужно отправить пользователя на вход.
    pub unauthorized: bool,
}

impl From<&ChatClientError> for QueryError {
    fn from(value: &ChatClientError) -> Self {
        Self {
            message: value.to_string(),
            unauthorized: value.is_unauthorized(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Снимок состояния запроса для представления.
pub struct QueryState<T> {
    /// Последние успешно загруженные данные.
    pub data: Option<T>,
    /// Ошибка последней загрузки; очищается следующей успешной.
    pub error: Option<QueryError>,
}

impl<T> QueryState<T> {
    /// Данных ещё нет и ошибок не было: показываем загрузку.
    pub fn is_pending(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    /// Данных нет, последняя загрузка упала: показываем ошибку с повтором.
    pub fn is_error(&self) -> bool {
        self.data.is_none() && self.error.is_some()
    }

    /// Данные есть, но последняя загрузка упала: показываем устаревшие.
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

#[derive(Debug)]
struct Entry {
    data: Option<QueryData>,
    updated_at: Option<Instant>,
    last_used: Instant,
    error: Option<QueryError>,
    invalidated: bool,
    observers: usize,
}

impl Entry {
    fn new(now: Instant) -> Self {
        Self {
            data: None,
            updated_at: None,
            last_used: now,
            error: None,
            invalidated: false,
            observers: 0,
        }
    }

    fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        match (&self.data, self.updated_at) {
            (Some(_), Some(updated_at)) => {
                !self.invalidated && now.saturating_duration_since(updated_at) < stale_time
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
/// Кэш серверного состояния.
///
/// Разделяется через `Arc`; мьютекс никогда не удерживается через `.await`.
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    /// Пустой кэш.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        // Отсутствие подписчиков не ошибка.
        let _ = self.events.send(event);
    }

    /// Подписка на события кэша.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Текущие данные по ключу.
    pub fn get<T: Cacheable>(&self, key: &QueryKey) -> Option<T> {
        self.state(key).data
    }

    /// Снимок данных и последней ошибки по ключу.
    pub fn state<T: Cacheable>(&self, key: &QueryKey) -> QueryState<T> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = now;
                QueryState {
                    data: entry.data.as_ref().and_then(T::from_data),
                    error: entry.error.clone(),
                }
            }
            None => QueryState {
                data: None,
                error: None,
            },
        }
    }

    /// Записывает свежие данные, заменяя прежние целиком.
    pub fn set<T: Cacheable>(&self, key: QueryKey, value: T) {
        let now = Instant::now();
        {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now));
            entry.data = Some(value.into_data());
            entry.updated_at = Some(now);
            entry.last_used = now;
            entry.error = None;
            entry.invalidated = false;
        }
        self.emit(CacheEvent::Updated(key));
    }

    /// Фиксирует ошибку загрузки, прежние данные остаются.
    pub fn set_error(&self, key: QueryKey, error: QueryError) {
        let now = Instant::now();
        {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now));
            entry.error = Some(error);
            entry.last_used = now;
        }
        self.emit(CacheEvent::Failed(key));
    }

    /// Данные по ключу есть, не инвалидированы и моложе `stale_time`.
    pub fn is_fresh(&self, key: &QueryKey, stale_time: Duration) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.is_fresh(now, stale_time))
    }

    /// Помечает ключ устаревшим и оповещает поллеры о необходимости перезагрузки.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.invalidated = true;
        }
        tracing::debug!(?key, "query invalidated");
        self.emit(CacheEvent::Invalidated(key.clone()));
    }

    /// Удаляет всё содержимое кэша.
    pub fn clear(&self) {
        self.lock().clear();
        self.emit(CacheEvent::Cleared);
    }

    /// Количество ключей в кэше.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Кэш пуст.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ключ существует в кэше.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Регистрирует активного наблюдателя ключа; пока guard жив, ключ не
    /// удаляется сборщиком мусора.
    pub fn observe(self: &Arc<Self>, key: QueryKey) -> ObserverGuard {
        let now = Instant::now();
        self.lock()
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now))
            .observers += 1;
        ObserverGuard {
            cache: Arc::clone(self),
            key,
        }
    }

    /// Удаляет ключи без наблюдателей, не использовавшиеся дольше `gc_time`.
    /// Возвращает количество удалённых ключей.
    pub fn collect_garbage(&self, gc_time: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.observers > 0 || now.saturating_duration_since(entry.last_used) < gc_time
        });
        before - entries.len()
    }

    /// Возвращает свежие данные из кэша или загружает их через `fetch`.
    ///
    /// Успешный результат записывается в кэш, ошибка фиксируется по ключу
    /// и возвращается вызывающему.
    pub async fn fetch_with<T, F, Fut>(
        &self,
        key: QueryKey,
        stale_time: Duration,
        fetch: F,
    ) -> ChatClientResult<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ChatClientResult<T>>,
    {
        if self.is_fresh(&key, stale_time) {
            if let Some(value) = self.get::<T>(&key) {
                tracing::debug!(?key, "query served from cache");
                return Ok(value);
            }
        }

        match fetch().await {
            Ok(value) => {
                self.set(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.set_error(key, QueryError::from(&err));
                Err(err)
            }
        }
    }

    fn release(&self, key: &QueryKey) {
        let now = Instant::now();
        if let Some(entry) = self.lock().get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.last_used = now;
        }
    }
}

#[derive(Debug)]
/// Активный наблюдатель ключа, см. [`QueryCache::observe`].
pub struct ObserverGuard {
    cache: Arc<QueryCache>,
    key: QueryKey,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(id: i64) -> Message {
        Message {
            id,
            from_user_id: 1,
            to_user_id: 2,
            content: format!("m{id}"),
            date: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn set_replaces_value_entirely() {
        let cache = QueryCache::new();
        let key = QueryKey::Conversation(2);

        cache.set(key.clone(), vec![message(1), message(2)]);
        cache.set(key.clone(), vec![message(3)]);

        let messages: Vec<Message> = cache.get(&key).expect("cached");
        assert_eq!(messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn get_with_wrong_type_returns_none() {
        let cache = QueryCache::new();
        cache.set(QueryKey::Conversation(2), vec![message(1)]);
        assert!(cache.get::<Vec<User>>(&QueryKey::Conversation(2)).is_none());
    }

    #[test]
    fn error_keeps_previous_data_visible() {
        let cache = QueryCache::new();
        let key = QueryKey::Chats;
        cache.set(key.clone(), Vec::<ChatSummary>::new());
        cache.set_error(
            key.clone(),
            QueryError {
                message: "boom".to_string(),
                unauthorized: false,
            },
        );

        let state = cache.state::<Vec<ChatSummary>>(&key);
        assert!(state.is_stale());
        assert!(!state.is_error());
        assert_eq!(state.data, Some(Vec::new()));
    }

    #[test]
    fn unknown_key_is_pending() {
        let cache = QueryCache::new();
        let state = cache.state::<Profile>(&QueryKey::Profile);
        assert!(state.is_pending());
    }

    #[test]
    fn invalidate_emits_event_and_marks_stale() {
        let cache = QueryCache::new();
        let key = QueryKey::Conversation(5);
        cache.set(key.clone(), vec![message(1)]);
        assert!(cache.is_fresh(&key, Duration::from_secs(60)));

        let mut events = cache.subscribe();
        cache.invalidate(&key);

        assert!(!cache.is_fresh(&key, Duration::from_secs(60)));
        assert_eq!(events.try_recv().ok(), Some(CacheEvent::Invalidated(key)));
    }

    #[tokio::test(start_paused = true)]
    async fn freshness_expires_after_stale_time() {
        let cache = QueryCache::new();
        let key = QueryKey::Users("al".to_string());
        cache.set(key.clone(), Vec::<User>::new());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.is_fresh(&key, Duration::from_secs(300)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.is_fresh(&key, Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_skips_observed_and_recent_keys() {
        let cache = Arc::new(QueryCache::new());
        let observed = QueryKey::Conversation(1);
        let idle = QueryKey::Users("bob".to_string());
        let recent = QueryKey::Users("carol".to_string());

        let guard = cache.observe(observed.clone());
        cache.set(observed.clone(), vec![message(1)]);
        cache.set(idle.clone(), Vec::<User>::new());

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        cache.set(recent.clone(), Vec::<User>::new());
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(cache.collect_garbage(Duration::from_secs(600)), 1);
        assert!(cache.contains(&observed));
        assert!(cache.contains(&recent));
        assert!(!cache.contains(&idle));

        drop(guard);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.collect_garbage(Duration::from_secs(600)), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn fetch_with_serves_fresh_value_without_fetching() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let key = QueryKey::Profile;
        let profile = Profile {
            id: 1,
            username: "alice".to_string(),
            fullname: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        };

        for _ in 0..3 {
            let fetched = cache
                .fetch_with(key.clone(), Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(profile.clone())
                })
                .await
                .expect("fetch");
            assert_eq!(fetched, profile);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&key);
        cache
            .fetch_with(key.clone(), Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(profile.clone())
            })
            .await
            .expect("refetch");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_with_records_error() {
        let cache = QueryCache::new();
        let result: ChatClientResult<Profile> = cache
            .fetch_with(QueryKey::Profile, Duration::from_secs(60), || async {
                Err(ChatClientError::Unauthorized)
            })
            .await;

        assert!(matches!(result, Err(ChatClientError::Unauthorized)));
        let state = cache.state::<Profile>(&QueryKey::Profile);
        assert!(state.is_error());
        assert!(state.error.is_some_and(|err| err.unauthorized));
    }
}
