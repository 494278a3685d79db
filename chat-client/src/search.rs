use std::sync::Arc;
use std::time::Duration;

use crate::api::ChatApi;
use crate::cache::{QueryCache, QueryKey};
use crate::error::ChatClientResult;
use crate::models::User;

/// Поиск пользователей с кэшированием по строке запроса.
#[derive(Clone)]
pub struct UserSearch {
    api: Arc<dyn ChatApi>,
    cache: Arc<QueryCache>,
    stale_time: Duration,
    gc_time: Duration,
}

impl UserSearch {
    /// `stale_time`: сколько результат отдаётся без запроса; `gc_time`:
    /// через сколько неиспользуемый результат удаляется.
    pub fn new(
        api: Arc<dyn ChatApi>,
        cache: Arc<QueryCache>,
        stale_time: Duration,
        gc_time: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            stale_time,
            gc_time,
        }
    }

    /// Ищет пользователей по строке.
    ///
    /// Пустая строка не уходит на сервер. Повторный запрос той же строки в
    /// пределах `stale_time` обслуживается из кэша.
    pub async fn search(&self, query: &str) -> ChatClientResult<Vec<User>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let collected = self.cache.collect_garbage(self.gc_time);
        if collected > 0 {
            tracing::debug!(collected, "dropped unused cache entries");
        }

        let api = Arc::clone(&self.api);
        self.cache
            .fetch_with(QueryKey::Users(query.to_string()), self.stale_time, || async move {
                api.search_users(query).await
            })
            .await
    }
}
