//! Text embedding service contract and the offline implementations.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::errors::{SmellError, SmellResult};

pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_CACHE_ENTRIES: usize = 4096;

/// `text -> fixed-dimension vector`. Implementations may be remote and slow;
/// callers must not hold a store lock across a call.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> SmellResult<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> SmellResult<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Lowercased word tokens, splitting snake_case, camelCase and digits.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for ch in word.chars() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

// ---------------------------------------------------------------------------
// HashingEmbedder
// ---------------------------------------------------------------------------

/// Deterministic feature-hashing bag of words. Needs no model download, so
/// clustering and ledger vectors work fully offline.
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> SmellResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = crc32fast::hash(token.as_bytes());
            let bucket = (hash & 0x7FFF_FFFF) as usize % self.dimension;
            // High bit picks the sign so collisions tend to cancel.
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let length = norm(&vector);
        if length > 0.0 {
            for value in &mut vector {
                *value /= length;
            }
        }
        Ok(vector)
    }
}

// ---------------------------------------------------------------------------
// CachingEmbedder
// ---------------------------------------------------------------------------

/// Bounded LRU memo in front of another embedder.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    max_entries: usize,
    cache: Mutex<IndexMap<String, Vec<f32>>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_entries: usize) -> Self {
        Self {
            inner,
            max_entries: max_entries.max(1),
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_over_capacity(&self) {
        let mut cache = self.cache.lock();
        while cache.len() > self.max_entries {
            cache.shift_remove_index(0);
        }
    }
}

impl Embedder for CachingEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, text: &str) -> SmellResult<Vec<f32>> {
        {
            let mut cache = self.cache.lock();
            if let Some(vector) = cache.shift_remove(text) {
                // Re-insert at the back for LRU order.
                cache.insert(text.to_string(), vector.clone());
                return Ok(vector);
            }
        }
        // The lock is released while the inner embedder runs.
        let vector = self.inner.embed(text)?;
        if vector.len() != self.inner.dimension() {
            return Err(SmellError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.inner.dimension(),
                vector.len()
            )));
        }
        self.cache.lock().insert(text.to_string(), vector.clone());
        self.evict_over_capacity();
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(&self, _text: &str) -> SmellResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn tokenize_splits_identifier_styles() {
        assert_eq!(
            tokenize("def getUserById(user_id)"),
            vec!["def", "get", "user", "by", "id", "user", "id"]
        );
        assert!(tokenize("  ()  ").is_empty());
    }

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("def save_user()").unwrap();
        let b = embedder.embed("def save_user()").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_EMBEDDING_DIM);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);

        let empty = embedder.embed("").unwrap();
        assert!(empty.iter().all(|v| *v == 0.0));
        assert_eq!(cosine_similarity(&a, &empty), 0.0);
    }

    #[test]
    fn caching_embedder_memoizes_and_evicts() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachingEmbedder::new(inner.clone(), 2);
        cached.embed("a").unwrap();
        cached.embed("a").unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.embed("b").unwrap();
        cached.embed("c").unwrap();
        assert_eq!(cached.len(), 2);
        cached.embed("a").unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }
}
