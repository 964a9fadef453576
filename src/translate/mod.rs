//! Translation core: classifier gate, segmenter, canonical-key cache, and
//! the reconciliation service that merges cached and freshly fetched
//! segments back into selection order.

pub mod cache;
pub mod classify;
pub mod deepseek;
pub mod normalize;
pub mod segment;
pub mod service;

use async_trait::async_trait;
use serde::Serialize;

pub use cache::TranslationCache;
pub use service::TranslationService;

/// Final outcome of resolving one selection.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    /// Selection slices in document order, the unit of cache lookup.
    pub segments: Vec<String>,
    /// One translation per segment, same order.
    pub translations: Vec<String>,
    /// Percentage of segments satisfied from cache at lookup time.
    pub cache_ratio: f32,
    /// Joined output. Empty parts are dropped; never empty, falling back to
    /// the source selection.
    pub text: String,
}

/// Gateway capability: one translation call for one segment or chunk.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

#[derive(Debug)]
pub enum TranslateError {
    ApiError(String),
    RateLimited { retry_after_ms: u64 },
    Timeout,
    Cancelled,
    InvalidInput(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::ApiError(msg) => write!(f, "API error: {msg}"),
            TranslateError::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            TranslateError::Timeout => write!(f, "translation timeout"),
            TranslateError::Cancelled => write!(f, "translation cancelled"),
            TranslateError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

/// Deterministic offline translator for tests and keyless runs.
pub struct StubTranslator;

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        Ok(format!("[stub] {text}"))
    }
}
