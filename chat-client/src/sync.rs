//! Периодическая синхронизация ключа кэша с сервером.
//!
//! Поллер живёт, пока жив его [`PollHandle`]: первая загрузка сразу после
//! запуска, дальше с постоянным периодом. Инвалидация ключа вызывает
//! немедленную перезагрузку и перезапускает отсчёт периода.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::{CacheEvent, Cacheable, ObserverGuard, QueryCache, QueryError, QueryKey};
use crate::error::ChatClientResult;

/// Период опроса открытой переписки.
pub const CONVERSATION_POLL_INTERVAL: Duration = Duration::from_millis(4000);
/// Период опроса списка чатов.
pub const CHATS_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug)]
/// Handle запущенного поллера.
///
/// Drop останавливает дальнейшие загрузки. Запрос, который уже в полёте,
/// не прерывается и может успеть записать результат в кэш.
pub struct PollHandle {
    key: QueryKey,
    shutdown: watch::Sender<bool>,
    refresh: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Ключ, который синхронизирует поллер.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Немедленная перезагрузка (кнопка «повторить»).
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Останавливает поллер и дожидается завершения его задачи.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(key = ?self.key, error = %err, "poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Запускает поллер ключа `key` с периодом `period`.
///
/// Каждая успешная загрузка заменяет значение в кэше целиком, ошибка
/// сохраняется рядом с прежними данными. Повтор идёт с тем же периодом,
/// без backoff.
pub fn spawn_poller<T, F, Fut>(
    cache: Arc<QueryCache>,
    key: QueryKey,
    period: Duration,
    fetch: F,
) -> PollHandle
where
    T: Cacheable,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ChatClientResult<T>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = Arc::new(Notify::new());

    // Подписка до spawn: инвалидация сразу после запуска не теряется.
    let observer = cache.observe(key.clone());
    let events = cache.subscribe();

    let task = tokio::spawn(run_poller(
        cache,
        key.clone(),
        period,
        fetch,
        Subscription {
            _observer: observer,
            events,
            shutdown: shutdown_rx,
            refresh: Arc::clone(&refresh),
        },
    ));

    PollHandle {
        key,
        shutdown: shutdown_tx,
        refresh,
        task: Some(task),
    }
}

struct Subscription {
    _observer: ObserverGuard,
    events: broadcast::Receiver<CacheEvent>,
    shutdown: watch::Receiver<bool>,
    refresh: Arc<Notify>,
}

async fn run_poller<T, F, Fut>(
    cache: Arc<QueryCache>,
    key: QueryKey,
    period: Duration,
    mut fetch: F,
    subscription: Subscription,
) where
    T: Cacheable,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ChatClientResult<T>> + Send + 'static,
{
    let Subscription {
        _observer,
        mut events,
        mut shutdown,
        refresh,
    } = subscription;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(?key, ?period, "poller started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => ticker.reset(),
            event = events.recv() => match event {
                Ok(CacheEvent::Invalidated(invalidated)) if invalidated == key => ticker.reset(),
                Ok(_) => continue,
                // Пропущенные события могли содержать инвалидацию.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(?key, skipped, "poller lagged behind cache events");
                    ticker.reset();
                }
                Err(RecvError::Closed) => break,
            },
        }

        if *shutdown.borrow() {
            break;
        }

        match fetch().await {
            Ok(value) => cache.set(key.clone(), value),
            Err(err) => {
                tracing::warn!(?key, error = %err, "poll failed, keeping cached data");
                cache.set_error(key.clone(), QueryError::from(&err));
            }
        }
    }

    tracing::debug!(?key, "poller stopped");
}
