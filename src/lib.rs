//! Quick Translator core: segment-aware translation caching and
//! reconciliation for inline English -> Chinese selection translation.
//! The popup UI is an external collaborator; this crate owns the classifier
//! gate, segmentation, the multi-index cache, the resolve pipeline, and the
//! gateway client; rendering stays on the other side of the boundary.

pub mod cancellation;
pub mod config;
pub mod metrics;
pub mod sweep;
pub mod translate;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use config::Config;
use metrics::MetricsRegistry;
use translate::deepseek::DeepSeekClient;
use translate::{StubTranslator, TranslationCache, TranslationService, Translator};

/// Shared application state handed to the shell.
pub struct AppContext {
    pub service: Arc<TranslationService>,
    pub cache: Arc<TranslationCache>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Wire cache, gateway and service from a config. Falls back to the stub
/// translator when no API key is configured, so the pipeline stays usable
/// offline.
pub fn build(config: &Config) -> AppContext {
    let metrics = Arc::new(MetricsRegistry::new());
    let cache = Arc::new(TranslationCache::new(
        config.cache.max_size,
        config.cache.expire_time,
    ));

    let translator: Arc<dyn Translator> = match DeepSeekClient::new(&config.gateway) {
        Ok(client) => {
            info!("deepseek client initialized");
            Arc::new(client)
        }
        Err(e) => {
            warn!(error = %e, "deepseek client init failed, using stub translator");
            Arc::new(StubTranslator)
        }
    };

    let service = Arc::new(TranslationService::new(
        translator,
        Arc::clone(&cache),
        config.translation.clone(),
        Arc::clone(&metrics),
    ));

    AppContext {
        service,
        cache,
        metrics,
    }
}

/// Run the interactive shell: one selection per stdin line, translated and
/// printed as original/translation pairs with coverage stats.
pub async fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quick_translator=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    info!("quick-translator starting");

    let config = Config::from_env();
    let ctx = build(&config);
    let _sweep = sweep::spawn_expiry_sweep(Arc::clone(&ctx.cache), config.cache.cleanup_interval);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let selection = line.trim();
        if selection.is_empty() {
            continue;
        }
        if !ctx.service.is_translatable(selection) {
            println!("(selection is not translatable English text)");
            continue;
        }

        match ctx.service.resolve(selection).await {
            Ok(result) => {
                for (original, translated) in result.segments.iter().zip(&result.translations) {
                    println!("  {original}");
                    println!("  -> {translated}");
                }
                println!(
                    "cache coverage: {:.1}% | needs translation: {:.1}%",
                    result.cache_ratio,
                    100.0 - result.cache_ratio
                );
            }
            // Show the error message in place of the translation.
            Err(e) => println!("  -> {e}"),
        }
    }

    info!(cache_entries = ctx.cache.len(), "quick-translator exiting");
}
