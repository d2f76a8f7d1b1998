//! LRU cache for parsed objects, keyed by id.

use std::num::NonZeroUsize;

use lru::LruCache;
use vcs_hash::ObjectId;

use crate::Object;

pub struct ObjectCache {
    cache: LruCache<ObjectId, Object>,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached object, promoting it to most-recently-used.
    pub fn get(&mut self, id: &ObjectId) -> Option<&Object> {
        self.cache.get(id)
    }

    /// Peek at a cached object without promoting it.
    pub fn peek(&self, id: &ObjectId) -> Option<&Object> {
        self.cache.peek(id)
    }

    /// Insert an object, returning the evicted entry if the cache was full.
    pub fn insert(&mut self, id: ObjectId, obj: Object) -> Option<(ObjectId, Object)> {
        self.cache.push(id, obj)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.cache.contains(id)
    }
}
