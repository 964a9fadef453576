//! Reconciliation service: the top-level `resolve` pipeline.
//! Decides which parts of a selection are already cached, dispatches only
//! the miss set (one segment per call, with a pause between calls), and
//! reassembles the result in selection order. A gap found at reassembly is
//! retried individually and falls back to the source segment on failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::cache::TranslationCache;
use super::{classify, segment, TranslateError, Translation, Translator};
use crate::cancellation::{GenerationGuard, TaskGeneration};
use crate::config::TranslationConfig;
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};

pub struct TranslationService {
    translator: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    config: TranslationConfig,
    metrics: Arc<MetricsRegistry>,
    generations: TaskGeneration,
}

impl TranslationService {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        config: TranslationConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            translator,
            cache,
            config,
            metrics,
            generations: TaskGeneration::new(),
        }
    }

    /// Classifier gate with the service's configured minimum length.
    pub fn is_translatable(&self, text: &str) -> bool {
        classify::is_translatable(text, self.config.min_length)
    }

    /// Raw cache access, for callers that want to prefetch or inspect.
    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Resolve one selection into an ordered translation.
    ///
    /// A later call supersedes this one: the stale task notices between
    /// gateway calls and returns `Cancelled`. Gateway failures on the
    /// primary miss-set path abort the whole resolution; failures during
    /// reassembly retries degrade to the source text for that segment only.
    pub async fn resolve(&self, selection: &str) -> Result<Translation, TranslateError> {
        let guard = self.generations.cancel_and_advance();
        let ids = RequestIds::new(guard.my_generation());
        let resolve_span = self.metrics.span(metric_names::RESOLVE_DONE);

        let trimmed = selection.trim();
        if trimmed.is_empty() {
            return Err(TranslateError::InvalidInput("empty selection".into()));
        }

        // Whole-selection short circuit: strict levels only, so a loose
        // conflation cannot hijack an entire selection.
        if let Some(hit) = self.cache.lookup_strict(trimmed) {
            info!(request_id = %ids.request_id, "full_selection_cache_hit");
            self.metrics.record(metric_names::CACHE_COVERAGE, 100.0);
            resolve_span.finish();
            return Ok(Translation {
                segments: vec![trimmed.to_string()],
                translations: vec![hit.clone()],
                cache_ratio: 100.0,
                text: hit,
            });
        }

        let text = collapse_whitespace(trimmed);

        // Overflow: chunked selections are assumed novel and dispatched in
        // full, skipping the per-segment probe.
        if text.chars().count() > self.config.max_length {
            let chunks = segment::chunk(&text, self.config.max_length);
            info!(
                request_id = %ids.request_id,
                chars = text.chars().count(),
                chunks = chunks.len(),
                "selection_over_limit"
            );
            self.metrics.record(metric_names::CACHE_COVERAGE, 0.0);
            let fresh = self.translate_and_cache(&chunks, &guard, &ids).await?;
            let translations = self.reassemble(&chunks, &HashMap::new(), &fresh, &ids).await;
            let text = join_parts(&chunks, &translations);
            resolve_span.finish();
            return Ok(Translation {
                segments: chunks,
                translations,
                cache_ratio: 0.0,
                text,
            });
        }

        // A selection that yields zero or one sentence is looked up and
        // dispatched whole.
        let segments = segment::segment(&text, self.config.min_length);
        let segments: Vec<String> = if segments.len() <= 1 {
            vec![text.clone()]
        } else {
            segments.into_iter().map(|s| s.text).collect()
        };

        let mut cached: HashMap<String, String> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for seg in &segments {
            match self.cache.lookup(seg) {
                Some(hit) => {
                    cached.insert(seg.clone(), hit);
                }
                None => misses.push(seg.clone()),
            }
        }

        let cache_ratio =
            (segments.len() - misses.len()) as f32 / segments.len() as f32 * 100.0;
        self.metrics
            .record(metric_names::CACHE_COVERAGE, cache_ratio as f64);
        info!(
            request_id = %ids.request_id,
            segments = segments.len(),
            cached = segments.len() - misses.len(),
            cache_ratio = cache_ratio,
            "selection_partitioned"
        );

        let fresh = if misses.is_empty() {
            HashMap::new()
        } else {
            self.translate_and_cache(&misses, &guard, &ids).await?
        };

        let translations = self.reassemble(&segments, &cached, &fresh, &ids).await;
        let text = join_parts(&segments, &translations);
        resolve_span.finish();
        Ok(Translation {
            segments,
            translations,
            cache_ratio,
            text,
        })
    }

    /// Sequential per-segment dispatch: request, await, store, pause,
    /// proceed. Order stays trivially correct and the provider sees paced
    /// traffic. Any failure aborts the whole miss set.
    async fn translate_and_cache(
        &self,
        misses: &[String],
        guard: &GenerationGuard,
        ids: &RequestIds,
    ) -> Result<HashMap<String, String>, TranslateError> {
        let mut fresh = HashMap::new();

        for (i, seg) in misses.iter().enumerate() {
            if !guard.should_continue() {
                info!(request_id = %ids.request_id, "resolve_superseded");
                return Err(TranslateError::Cancelled);
            }

            debug!(
                request_id = %ids.request_id,
                index = i + 1,
                total = misses.len(),
                "segment_dispatch"
            );
            let gateway_span = self.metrics.span(metric_names::GATEWAY_CALL);
            let translated = self.translator.translate(seg).await?;
            gateway_span.finish();

            self.cache.store(seg, &translated);
            fresh.insert(seg.clone(), translated);

            if i + 1 < misses.len() {
                tokio::time::sleep(self.config.request_delay).await;
            }
        }

        Ok(fresh)
    }

    /// Walk the original segment order: cache map first, then the fresh
    /// batch, matched by segment text rather than index since hits and
    /// misses interleave. A segment found in neither gets one retry;
    /// if that also fails, the source text stands in for it.
    async fn reassemble(
        &self,
        segments: &[String],
        cached: &HashMap<String, String>,
        fresh: &HashMap<String, String>,
        ids: &RequestIds,
    ) -> Vec<String> {
        let mut parts = Vec::with_capacity(segments.len());

        for seg in segments {
            if let Some(translation) = cached.get(seg).or_else(|| fresh.get(seg)) {
                parts.push(translation.clone());
                continue;
            }

            warn!(request_id = %ids.request_id, "segment_missing_translation_retrying");
            let retry_span = self.metrics.span(metric_names::SEGMENT_RETRY);
            match self.translator.translate(seg).await {
                Ok(translation) => {
                    self.cache.store(seg, &translation);
                    parts.push(translation);
                }
                Err(e) => {
                    warn!(
                        request_id = %ids.request_id,
                        error = %e,
                        "segment_retry_failed_using_source"
                    );
                    parts.push(seg.clone());
                }
            }
            retry_span.finish();
        }

        parts
    }
}

/// Collapse internal whitespace runs to single spaces.
fn collapse_whitespace(text: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").unwrap())
        .replace_all(text, " ")
        .into_owned()
}

/// Join non-empty parts in selection order; a fully empty result falls back
/// to the source segments so the output is never empty.
fn join_parts(segments: &[String], translations: &[String]) -> String {
    let parts: Vec<&str> = translations
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        segments.join("\n")
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::StubTranslator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Stub that counts gateway calls.
    struct CountingStub {
        calls: AtomicUsize,
    }

    impl CountingStub {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Translator for CountingStub {
        async fn translate(&self, text: &str) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("[stub] {text}"))
        }
    }

    /// Stub that always fails.
    struct FailingStub;

    #[async_trait]
    impl Translator for FailingStub {
        async fn translate(&self, _text: &str) -> Result<String, TranslateError> {
            Err(TranslateError::ApiError("provider down".into()))
        }
    }

    /// Stub that returns whitespace for everything.
    struct BlankStub;

    #[async_trait]
    impl Translator for BlankStub {
        async fn translate(&self, _text: &str) -> Result<String, TranslateError> {
            Ok("   ".into())
        }
    }

    /// Stub that sleeps before answering, to keep a resolve in flight.
    struct SlowStub;

    #[async_trait]
    impl Translator for SlowStub {
        async fn translate(&self, text: &str) -> Result<String, TranslateError> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(format!("[slow] {text}"))
        }
    }

    fn test_config() -> TranslationConfig {
        TranslationConfig {
            min_length: 2,
            max_length: 2000,
            request_delay: Duration::from_millis(1),
        }
    }

    fn service_with(translator: Arc<dyn Translator>, config: TranslationConfig) -> TranslationService {
        TranslationService::new(
            translator,
            Arc::new(TranslationCache::new(100, Duration::from_secs(3600))),
            config,
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[tokio::test]
    async fn cold_then_warm_selection() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());

        let first = service
            .resolve("Hello world. This is a test.")
            .await
            .unwrap();
        assert_eq!(first.segments, vec!["Hello world.", "This is a test."]);
        assert_eq!(
            first.translations,
            vec!["[stub] Hello world.", "[stub] This is a test."]
        );
        assert_eq!(first.cache_ratio, 0.0);
        assert_eq!(first.text, "[stub] Hello world.\n[stub] This is a test.");
        assert_eq!(stub.calls(), 2);

        let second = service
            .resolve("Hello world. This is a test.")
            .await
            .unwrap();
        assert_eq!(second.cache_ratio, 100.0);
        assert_eq!(second.translations, first.translations);
        // No further gateway traffic.
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn whole_selection_hit_short_circuits() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());
        service.cache().store("Hello world. Bye.", "你好世界。再见。");

        let result = service.resolve("Hello world. Bye.").await.unwrap();
        assert_eq!(result.segments, vec!["Hello world. Bye."]);
        assert_eq!(result.text, "你好世界。再见。");
        assert_eq!(result.cache_ratio, 100.0);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn order_is_preserved_with_interleaved_hits() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());
        service.cache().store("Second sentence.", "第二句。");

        let result = service
            .resolve("First sentence. Second sentence. Third sentence.")
            .await
            .unwrap();
        assert_eq!(
            result.translations,
            vec![
                "[stub] First sentence.",
                "第二句。",
                "[stub] Third sentence."
            ]
        );
        assert!((result.cache_ratio - 100.0 / 3.0).abs() < 0.01);
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn ratio_and_complement_always_total_one_hundred() {
        let service = service_with(CountingStub::new(), test_config());
        service.cache().store("Second sentence.", "第二句。");

        let result = service
            .resolve("First sentence. Second sentence.")
            .await
            .unwrap();
        assert_eq!(result.cache_ratio + (100.0 - result.cache_ratio), 100.0);
        assert_eq!(result.cache_ratio, 50.0);
    }

    #[tokio::test]
    async fn fully_cached_selection_makes_no_gateway_calls() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());
        service.cache().store("First sentence.", "第一句。");
        service.cache().store("Second sentence.", "第二句。");

        let result = service
            .resolve("First sentence. Second sentence.")
            .await
            .unwrap();
        assert_eq!(result.cache_ratio, 100.0);
        assert_eq!(result.translations, vec!["第一句。", "第二句。"]);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn primary_gateway_failure_aborts_resolution() {
        let service = service_with(Arc::new(FailingStub), test_config());
        let result = service.resolve("First sentence. Second sentence.").await;
        assert!(matches!(result, Err(TranslateError::ApiError(_))));
    }

    #[tokio::test]
    async fn reassembly_gap_retries_and_stores() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());
        let ids = RequestIds::new(0);

        let segments = vec!["Lost segment.".to_string()];
        let parts = service
            .reassemble(&segments, &HashMap::new(), &HashMap::new(), &ids)
            .await;
        assert_eq!(parts, vec!["[stub] Lost segment."]);
        assert_eq!(stub.calls(), 1);
        // The retry result landed in the cache.
        assert_eq!(
            service.cache().lookup("Lost segment."),
            Some("[stub] Lost segment.".into())
        );
    }

    #[tokio::test]
    async fn failed_retry_falls_back_to_source_text() {
        let service = service_with(Arc::new(FailingStub), test_config());
        let ids = RequestIds::new(0);

        let segments = vec!["Alpha.".to_string(), "Beta.".to_string()];
        let cached: HashMap<String, String> =
            [("Alpha.".to_string(), "甲。".to_string())].into();
        let parts = service
            .reassemble(&segments, &cached, &HashMap::new(), &ids)
            .await;
        assert_eq!(parts, vec!["甲。", "Beta."]);
    }

    #[tokio::test]
    async fn blank_translations_fall_back_to_source_selection() {
        let service = service_with(Arc::new(BlankStub), test_config());
        let result = service
            .resolve("First sentence. Second sentence.")
            .await
            .unwrap();
        // Every part was whitespace; the joined text degrades to the source.
        assert_eq!(result.text, "First sentence.\nSecond sentence.");
    }

    #[tokio::test]
    async fn single_sentence_is_resolved_whole() {
        let stub = CountingStub::new();
        let service = service_with(stub.clone(), test_config());

        let result = service.resolve("Just one sentence here.").await.unwrap();
        assert_eq!(result.segments, vec!["Just one sentence here."]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn internal_whitespace_is_collapsed_before_segmentation() {
        let service = service_with(CountingStub::new(), test_config());
        let result = service
            .resolve("Spaced   out.   Very\n\nspaced.")
            .await
            .unwrap();
        assert_eq!(result.segments, vec!["Spaced out.", "Very spaced."]);
    }

    #[tokio::test]
    async fn oversized_selection_is_chunked_and_fully_dispatched() {
        let stub = CountingStub::new();
        let config = TranslationConfig {
            min_length: 2,
            max_length: 20,
            request_delay: Duration::from_millis(1),
        };
        let service = service_with(stub.clone(), config);
        // Pre-cache one sentence; the overflow path must ignore it.
        service.cache().store("Aaaa bbbb.", "不用");

        let result = service
            .resolve("Aaaa bbbb. Cccc dddd. Eeee ffff.")
            .await
            .unwrap();
        assert_eq!(result.cache_ratio, 0.0);
        assert!(result.segments.len() >= 2);
        assert_eq!(stub.calls(), result.segments.len());
        for chunk in &result.segments {
            assert!(chunk.chars().count() <= 20);
        }
    }

    #[tokio::test]
    async fn empty_selection_is_invalid_input() {
        let service = service_with(CountingStub::new(), test_config());
        let result = service.resolve("   ").await;
        assert!(matches!(result, Err(TranslateError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn newer_selection_supersedes_inflight_resolve() {
        let service = Arc::new(service_with(Arc::new(SlowStub), test_config()));

        let racing = Arc::clone(&service);
        let first = tokio::spawn(async move {
            racing
                .resolve("One sentence. Two sentence. Three sentence.")
                .await
        });
        // Let the first resolve get its initial gateway call in flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = service.resolve("Brand new selection.").await;

        assert!(second.is_ok());
        assert!(matches!(
            first.await.unwrap(),
            Err(TranslateError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn classifier_gate_uses_configured_min_length() {
        let service = service_with(Arc::new(StubTranslator), test_config());
        assert!(service.is_translatable("Hello there"));
        assert!(!service.is_translatable("你好"));
        assert!(!service.is_translatable("42"));
    }

    #[test]
    fn join_parts_drops_blanks_and_keeps_order() {
        let segments = vec!["a.".to_string(), "b.".to_string(), "c.".to_string()];
        let translations = vec!["一。".to_string(), " ".to_string(), "三。".to_string()];
        assert_eq!(join_parts(&segments, &translations), "一。\n三。");
    }

    #[test]
    fn collapse_whitespace_flattens_runs() {
        assert_eq!(collapse_whitespace("a\t b\n\nc"), "a b c");
    }
}
