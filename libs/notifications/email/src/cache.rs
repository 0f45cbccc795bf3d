//! Bounded LRU cache in front of the template engine.
//!
//! Keys are `"{template_id}:{fingerprint}"`, where the fingerprint is the hex
//! SHA-256 of the serialized render data (object keys sorted). Rendering
//! happens outside the lock; two concurrent misses for the same key may both
//! render, and the later insert wins. Entries are inserted whole, so readers never see a partial one.

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::EmailResult;
use crate::templates::{RenderedEmail, TemplateEngine, TemplateId};

/// Cache statistics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_renders: u64,
    pub average_render_time_ms: f64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
}

struct Entry {
    value: Arc<RenderedEmail>,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, Entry>,
    /// last-used tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
    total_renders: u64,
    render_time: Duration,
    evictions: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) -> Option<Arc<RenderedEmail>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, key.to_string());
        Some(entry.value.clone())
    }

    fn insert(&mut self, key: String, value: Arc<RenderedEmail>, max_size: usize) {
        let tick = self.next_tick();
        if let Some(previous) = self.entries.insert(
            key.clone(),
            Entry {
                value,
                last_used: tick,
            },
        ) {
            self.recency.remove(&previous.last_used);
        }
        self.recency.insert(tick, key);

        while self.entries.len() > max_size {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
    }
}

/// Memoizing wrapper around [`TemplateEngine`].
pub struct TemplateCache {
    engine: TemplateEngine,
    max_size: usize,
    inner: Mutex<CacheInner>,
}

impl TemplateCache {
    pub fn new(engine: TemplateEngine, max_size: usize) -> Self {
        Self {
            engine,
            max_size: max_size.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Render through the cache. Render errors are returned and not cached.
    pub fn render_cached(&self, id: TemplateId, data: &Value) -> EmailResult<Arc<RenderedEmail>> {
        let key = cache_key(id, data);

        {
            let mut inner = self.inner.lock();
            if let Some(hit) = inner.touch(&key) {
                inner.hits += 1;
                counter!("email_template_cache_hits_total", "template" => id.as_ref().to_string())
                    .increment(1);
                return Ok(hit);
            }
            inner.misses += 1;
        }
        counter!("email_template_cache_misses_total", "template" => id.as_ref().to_string())
            .increment(1);

        let started = Instant::now();
        let rendered = Arc::new(self.engine.render(id, data)?);
        let elapsed = started.elapsed();

        let mut inner = self.inner.lock();
        inner.total_renders += 1;
        inner.render_time += elapsed;
        inner.insert(key, rendered.clone(), self.max_size);
        debug!(
            template = %id,
            render_us = elapsed.as_micros() as u64,
            size = inner.entries.len(),
            "Template rendered and cached"
        );

        Ok(rendered)
    }

    /// Empty the cache and reset its statistics.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let cleared = inner.entries.len();
        *inner = CacheInner::default();
        cleared
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups > 0 {
                inner.hits as f64 / lookups as f64
            } else {
                0.0
            },
            total_renders: inner.total_renders,
            average_render_time_ms: if inner.total_renders > 0 {
                inner.render_time.as_secs_f64() * 1000.0 / inner.total_renders as f64
            } else {
                0.0
            },
            evictions: inner.evictions,
            size: inner.entries.len(),
            max_size: self.max_size,
        }
    }
}

/// Cache key for a template and its render data.
///
/// `serde_json` objects keep their keys sorted, so equal data serializes to
/// the same bytes whatever order its fields were inserted in.
pub fn cache_key(id: TemplateId, data: &Value) -> String {
    format!("{id}:{:x}", Sha256::digest(data.to_string().as_bytes()))
}
