/*!
 * Dictionary lookup service with a bounded LRU cache.
 *
 * Lookups are deterministic for a given model, so results are cached keyed
 * by word, context, target language and the model that produced them. A
 * model switch naturally misses the cache without any invalidation pass,
 * and the cache is bounded so long sessions cannot grow it without limit.
 */

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::engines::LookupResult;
use crate::errors::{AppError, AppResult};
use crate::language_utils::normalize_language_hint;
use crate::model_manager::ModelManager;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    word: String,
    context: Option<String>,
    target_language: String,
    model_id: String,
}

/// Bounded LRU map from lookup parameters to results
struct LruCache {
    capacity: usize,
    entries: HashMap<CacheKey, LookupResult>,
    /// Keys in recency order, least recent first
    order: VecDeque<CacheKey>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<LookupResult> {
        let result = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(result)
    }

    fn insert(&mut self, key: CacheKey, value: LookupResult) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Serves word lookups against the lookup role's model
pub struct LookupService {
    manager: Arc<ModelManager>,
    cache: Mutex<LruCache>,
}

impl LookupService {
    pub fn new(manager: Arc<ModelManager>, cache_capacity: usize) -> Self {
        Self {
            manager,
            cache: Mutex::new(LruCache::new(cache_capacity)),
        }
    }

    /// Look up a word, serving repeated queries from the cache
    pub async fn lookup(
        &self,
        word: &str,
        context: Option<&str>,
        target_language: &str,
    ) -> AppResult<LookupResult> {
        let word = word.trim();
        if word.is_empty() {
            return Err(AppError::InvalidInput("word must not be empty".to_string()));
        }
        let target = normalize_language_hint(target_language)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        let key = CacheKey {
            word: word.to_string(),
            context: context.map(str::to_string),
            target_language: target.clone(),
            model_id: self
                .manager
                .selected_model(crate::app_config::ModelRole::Lookup),
        };

        if let Some(cached) = self.cache.lock().get(&key) {
            debug!("Lookup cache hit for '{}'", word);
            return Ok(cached);
        }

        let result = {
            let lease = self.manager.acquire_lookup().await?;
            lease.engine().lookup(word, context, &target).await?
        };

        self.cache.lock().insert(key, result.clone());
        Ok(result)
    }

    /// Number of cached results
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for LookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("cached", &self.cache_len())
            .finish_non_exhaustive()
    }
}
