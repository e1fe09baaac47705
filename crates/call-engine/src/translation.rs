//! Real-time call translation
//!
//! Lets a caller hold the conversation in their own language while the
//! assistant works in the platform's service language: caller speech is
//! translated before it reaches the AI turn, and spoken utterances are
//! translated back before the carrier plays them.
//!
//! Translation never fails a call. A provider error falls back to the
//! untranslated text with zero confidence, and anything below the
//! confidence floor is discarded the same way — a wrong sentence is worse
//! than an untranslated one.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Languages the platform can translate between
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it", "pt"];

/// Confidence floor below which a translation is discarded
pub const MIN_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Error, Clone)]
pub enum TranslationError {
    #[error("translation provider unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported language pair: {from_lang} -> {target}")]
    UnsupportedPair { from_lang: String, target: String },
}

/// One translation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    pub source: String,
    pub target: String,
    /// 0-1, provider-reported
    pub confidence: f64,
    pub cached: bool,
}

/// Capability trait over the external translation engine. Implementations
/// are fixed at startup; tests use scripted providers.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<Translation, TranslationError>;
}

/// Default provider: returns the text unchanged with full confidence.
/// Deployments without a translation backend keep working, just
/// monolingually.
pub struct PassthroughTranslator;

#[async_trait]
impl TranslationProvider for PassthroughTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<Translation, TranslationError> {
        Ok(Translation {
            text: text.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            confidence: 1.0,
            cached: false,
        })
    }
}

/// Aggregate translation counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TranslationStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub common_phrase_hits: u64,
    pub provider_translations: u64,
    pub low_confidence_discards: u64,
    pub failures: u64,
}

/// Translation service: provider + phrase table + result cache + quality
/// accounting.
pub struct TranslationService {
    provider: RwLock<Arc<dyn TranslationProvider>>,
    /// (source language, lowercased phrase) -> target language -> phrase
    common_phrases: DashMap<(String, String), HashMap<String, String>>,
    cache: DashMap<String, Translation>,
    stats: Mutex<TranslationStats>,
}

impl TranslationService {
    pub fn new() -> Self {
        let service = TranslationService {
            provider: RwLock::new(Arc::new(PassthroughTranslator)),
            common_phrases: DashMap::new(),
            cache: DashMap::new(),
            stats: Mutex::new(TranslationStats::default()),
        };
        service.seed_common_phrases();
        service
    }

    pub fn set_provider(&self, provider: Arc<dyn TranslationProvider>) {
        *self.provider.write() = provider;
    }

    pub fn supports(&self, language: &str) -> bool {
        SUPPORTED_LANGUAGES.contains(&language)
    }

    pub fn stats(&self) -> TranslationStats {
        *self.stats.lock()
    }

    /// Teach the service a phrase translation for future calls
    pub fn add_common_phrase(
        &self,
        source: &str,
        phrase: &str,
        translations: HashMap<String, String>,
    ) {
        self.common_phrases.insert(
            (source.to_string(), phrase.trim().to_lowercase()),
            translations,
        );
    }

    /// Translate a line of conversation.
    ///
    /// Infallible by design: a same-language pair, an unsupported pair, a
    /// provider failure, or a low-confidence result all return the
    /// original text so the call keeps moving.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> Translation {
        if source == target {
            return Translation {
                text: text.to_string(),
                source: source.to_string(),
                target: target.to_string(),
                confidence: 1.0,
                cached: false,
            };
        }
        self.stats.lock().requests += 1;

        if !self.supports(source) || !self.supports(target) {
            warn!(source, target, "unsupported translation pair");
            self.stats.lock().failures += 1;
            return untranslated(text, source, target);
        }

        // Common phrases beat the cache and the provider
        if let Some(translations) = self
            .common_phrases
            .get(&(source.to_string(), text.trim().to_lowercase()))
        {
            if let Some(phrase) = translations.get(target) {
                self.stats.lock().common_phrase_hits += 1;
                return Translation {
                    text: phrase.clone(),
                    source: source.to_string(),
                    target: target.to_string(),
                    confidence: 1.0,
                    cached: true,
                };
            }
        }

        let key = cache_key(text, source, target);
        if let Some(hit) = self.cache.get(&key) {
            self.stats.lock().cache_hits += 1;
            let mut result = hit.clone();
            result.cached = true;
            return result;
        }

        let provider = self.provider.read().clone();
        match provider.translate(text, source, target).await {
            Ok(result) if result.confidence >= MIN_CONFIDENCE => {
                self.stats.lock().provider_translations += 1;
                self.cache.insert(key, result.clone());
                result
            }
            Ok(result) => {
                debug!(confidence = result.confidence, "translation below confidence floor");
                self.stats.lock().low_confidence_discards += 1;
                untranslated(text, source, target)
            }
            Err(e) => {
                warn!(error = %e, source, target, "translation failed; using original text");
                self.stats.lock().failures += 1;
                untranslated(text, source, target)
            }
        }
    }

    fn seed_common_phrases(&self) {
        let seed: &[(&str, &[(&str, &str)])] = &[
            ("hello", &[("es", "hola"), ("fr", "bonjour"), ("de", "hallo"), ("it", "ciao"), ("pt", "olá")]),
            ("thank you", &[("es", "gracias"), ("fr", "merci"), ("de", "danke"), ("it", "grazie"), ("pt", "obrigado")]),
            ("goodbye", &[("es", "adiós"), ("fr", "au revoir"), ("de", "auf wiedersehen"), ("it", "arrivederci"), ("pt", "adeus")]),
            ("yes", &[("es", "sí"), ("fr", "oui"), ("de", "ja"), ("it", "sì"), ("pt", "sim")]),
            ("no", &[("es", "no"), ("fr", "non"), ("de", "nein"), ("it", "no"), ("pt", "não")]),
            ("please", &[("es", "por favor"), ("fr", "s'il vous plaît"), ("de", "bitte"), ("it", "per favore"), ("pt", "por favor")]),
            ("help", &[("es", "ayuda"), ("fr", "aide"), ("de", "hilfe"), ("it", "aiuto"), ("pt", "ajuda")]),
        ];
        for (phrase, pairs) in seed {
            let translations: HashMap<String, String> = pairs
                .iter()
                .map(|(lang, text)| (lang.to_string(), text.to_string()))
                .collect();
            self.add_common_phrase("en", phrase, translations);
        }
    }
}

impl Default for TranslationService {
    fn default() -> Self {
        Self::new()
    }
}

fn untranslated(text: &str, source: &str, target: &str) -> Translation {
    Translation {
        text: text.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        confidence: 0.0,
        cached: false,
    }
}

fn cache_key(text: &str, source: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b":");
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(target.as_bytes());
    BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TaggingProvider {
        calls: AtomicU32,
        confidence: f64,
    }

    impl TaggingProvider {
        fn new(confidence: f64) -> Arc<Self> {
            Arc::new(TaggingProvider {
                calls: AtomicU32::new(0),
                confidence,
            })
        }
    }

    #[async_trait]
    impl TranslationProvider for TaggingProvider {
        async fn translate(
            &self,
            text: &str,
            source: &str,
            target: &str,
        ) -> Result<Translation, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Translation {
                text: format!("[{}] {}", target, text),
                source: source.to_string(),
                target: target.to_string(),
                confidence: self.confidence,
                cached: false,
            })
        }
    }

    #[tokio::test]
    async fn same_language_is_a_no_op() {
        let service = TranslationService::new();
        let result = service.translate("hello there", "en", "en").await;
        assert_eq!(result.text, "hello there");
        assert_eq!(service.stats().requests, 0);
    }

    #[tokio::test]
    async fn common_phrases_skip_the_provider() {
        let service = TranslationService::new();
        let provider = TaggingProvider::new(0.95);
        service.set_provider(provider.clone());

        let result = service.translate("Hello", "en", "es").await;
        assert_eq!(result.text, "hola");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.stats().common_phrase_hits, 1);
    }

    #[tokio::test]
    async fn provider_results_are_cached() {
        let service = TranslationService::new();
        let provider = TaggingProvider::new(0.95);
        service.set_provider(provider.clone());

        let first = service.translate("where is my order", "en", "fr").await;
        assert_eq!(first.text, "[fr] where is my order");
        assert!(!first.cached);

        let second = service.translate("where is my order", "en", "fr").await;
        assert_eq!(second.text, "[fr] where is my order");
        assert!(second.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn low_confidence_results_fall_back_to_the_original() {
        let service = TranslationService::new();
        service.set_provider(TaggingProvider::new(0.2));

        let result = service.translate("a subtle idiom", "en", "de").await;
        assert_eq!(result.text, "a subtle idiom");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(service.stats().low_confidence_discards, 1);
    }

    #[tokio::test]
    async fn provider_failure_never_fails_the_call() {
        struct BrokenProvider;

        #[async_trait]
        impl TranslationProvider for BrokenProvider {
            async fn translate(
                &self,
                _text: &str,
                _source: &str,
                _target: &str,
            ) -> Result<Translation, TranslationError> {
                Err(TranslationError::Unavailable("connection refused".into()))
            }
        }

        let service = TranslationService::new();
        service.set_provider(Arc::new(BrokenProvider));
        let result = service.translate("hola, necesito ayuda", "es", "en").await;
        assert_eq!(result.text, "hola, necesito ayuda");
        assert_eq!(service.stats().failures, 1);
    }

    #[tokio::test]
    async fn unsupported_pair_is_left_alone() {
        let service = TranslationService::new();
        let result = service.translate("konnichiwa", "ja", "en").await;
        assert_eq!(result.text, "konnichiwa");
        assert_eq!(service.stats().failures, 1);
    }

    #[tokio::test]
    async fn taught_phrases_are_used() {
        let service = TranslationService::new();
        service.add_common_phrase(
            "en",
            "one moment",
            [("es".to_string(), "un momento".to_string())].into(),
        );
        let result = service.translate("One moment", "en", "es").await;
        assert_eq!(result.text, "un momento");
    }
}
