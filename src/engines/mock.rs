/*!
 * Mock engine implementations for testing and development.
 *
 * This module provides a mock engine factory that simulates different
 * behaviors:
 * - `MockEngineFactory::working()` - All engines succeed deterministically
 * - `MockEngineFactory::failing_load()` - Every load attempt fails
 * - `MockEngineFactory::failing_inference()` - Loads succeed, inference fails
 * - `MockEngineFactory::flaky_translation(n)` - First n translate calls fail
 *
 * Engines record load and unload events in a shared journal so tests can
 * assert lifecycle ordering. A segment whose text contains the
 * `UNTRANSLATABLE_MARKER` always fails translation, regardless of behavior.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::EngineError;
use crate::engines::{
    DictionaryLookup, EngineFactory, ForcedAligner, LookupResult, RecognizedSegment,
    SpeechRecognizer, Translator,
};
use crate::subtitle_processor::WordTiming;

/// Text marker that makes the mock translator fail every attempt
pub const UNTRANSLATABLE_MARKER: &str = "<<untranslatable>>";

/// Behavior mode for the mock engine factory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// All engines succeed with deterministic output
    Working,
    /// Every load attempt fails
    FailingLoad,
    /// Loads succeed, every inference call fails
    FailingInference,
    /// First n translate calls fail, later calls succeed
    FlakyTranslation { fail_first: usize },
    /// Simulates slow inference (for cancellation testing)
    Slow { delay_ms: u64 },
}

/// Mock engine factory for testing the pipeline and model manager
#[derive(Debug, Clone)]
pub struct MockEngineFactory {
    /// Behavior mode
    behavior: MockBehavior,
    /// Segments the mock recognizer returns
    script: Arc<Vec<RecognizedSegment>>,
    /// Translate call counter, shared across clones
    translate_count: Arc<AtomicUsize>,
    /// Load/unload event journal, shared across clones
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockEngineFactory {
    /// Create a new mock factory with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            script: Arc::new(default_script()),
            translate_count: Arc::new(AtomicUsize::new(0)),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock factory
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a factory whose loads always fail
    pub fn failing_load() -> Self {
        Self::new(MockBehavior::FailingLoad)
    }

    /// Create a factory whose engines always fail at inference
    pub fn failing_inference() -> Self {
        Self::new(MockBehavior::FailingInference)
    }

    /// Create a factory whose first `fail_first` translate calls fail
    pub fn flaky_translation(fail_first: usize) -> Self {
        Self::new(MockBehavior::FlakyTranslation { fail_first })
    }

    /// Create a factory with slow inference
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Replace the segments the mock recognizer returns
    pub fn with_script(mut self, segments: Vec<RecognizedSegment>) -> Self {
        self.script = Arc::new(segments);
        self
    }

    /// Snapshot of recorded load/unload events, in order
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Number of translate calls made so far
    pub fn translate_calls(&self) -> usize {
        self.translate_count.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str, role: &str, model_id: &str) {
        self.journal.lock().push(format!("{} {} {}", event, role, model_id));
    }

    fn check_load(&self, role: &str, model_id: &str) -> Result<(), EngineError> {
        if self.behavior == MockBehavior::FailingLoad {
            return Err(EngineError::LoadFailed {
                model_id: model_id.to_string(),
                reason: "simulated load failure".to_string(),
            });
        }
        self.record("load", role, model_id);
        Ok(())
    }

    async fn simulate_inference(&self) -> Result<(), EngineError> {
        match self.behavior {
            MockBehavior::FailingInference => Err(EngineError::InferenceFailed(
                "simulated inference failure".to_string(),
            )),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn load_recognizer(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn SpeechRecognizer>, EngineError> {
        self.check_load("asr", model_id)?;
        Ok(Arc::new(MockRecognizer {
            model_id: model_id.to_string(),
            factory: self.clone(),
        }))
    }

    async fn load_aligner(&self, model_id: &str) -> Result<Arc<dyn ForcedAligner>, EngineError> {
        self.check_load("forced_aligner", model_id)?;
        Ok(Arc::new(MockAligner {
            model_id: model_id.to_string(),
            factory: self.clone(),
        }))
    }

    async fn load_translator(&self, model_id: &str) -> Result<Arc<dyn Translator>, EngineError> {
        self.check_load("translator", model_id)?;
        Ok(Arc::new(MockTranslator {
            model_id: model_id.to_string(),
            factory: self.clone(),
        }))
    }

    async fn load_lookup(&self, model_id: &str) -> Result<Arc<dyn DictionaryLookup>, EngineError> {
        self.check_load("lookup", model_id)?;
        Ok(Arc::new(MockLookup {
            model_id: model_id.to_string(),
            factory: self.clone(),
        }))
    }
}

fn default_script() -> Vec<RecognizedSegment> {
    vec![
        RecognizedSegment {
            start_time_ms: 0,
            end_time_ms: 2_000,
            text: "Hello and welcome back.".to_string(),
        },
        RecognizedSegment {
            start_time_ms: 2_500,
            end_time_ms: 5_000,
            text: "Today we look at the harbor.".to_string(),
        },
        RecognizedSegment {
            start_time_ms: 5_500,
            end_time_ms: 8_000,
            text: "Thanks for watching.".to_string(),
        },
    ]
}

/// Mock speech recognizer returning the factory's scripted segments
#[derive(Debug)]
struct MockRecognizer {
    model_id: String,
    factory: MockEngineFactory,
}

impl Drop for MockRecognizer {
    fn drop(&mut self) {
        self.factory.record("unload", "asr", &self.model_id);
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        _language_hint: Option<&str>,
    ) -> Result<Vec<RecognizedSegment>, EngineError> {
        if !audio_path.exists() {
            return Err(EngineError::InferenceFailed(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }
        self.factory.simulate_inference().await?;
        Ok(self.factory.script.as_ref().clone())
    }
}

/// Mock aligner distributing word timings evenly across each segment
#[derive(Debug)]
struct MockAligner {
    model_id: String,
    factory: MockEngineFactory,
}

impl Drop for MockAligner {
    fn drop(&mut self) {
        self.factory.record("unload", "forced_aligner", &self.model_id);
    }
}

#[async_trait]
impl ForcedAligner for MockAligner {
    async fn align(
        &self,
        _audio_path: &Path,
        segments: &[RecognizedSegment],
    ) -> Result<Vec<Vec<WordTiming>>, EngineError> {
        self.factory.simulate_inference().await?;

        let mut aligned = Vec::with_capacity(segments.len());
        for segment in segments {
            let words: Vec<&str> = segment.text.split_whitespace().collect();
            if words.is_empty() {
                aligned.push(Vec::new());
                continue;
            }

            let span = segment.end_time_ms.saturating_sub(segment.start_time_ms);
            let slot = span / words.len() as u64;
            let timings = words
                .iter()
                .enumerate()
                .map(|(i, word)| WordTiming {
                    text: word.to_string(),
                    start_time_ms: segment.start_time_ms + slot * i as u64,
                    end_time_ms: segment.start_time_ms + slot * (i as u64 + 1),
                    confidence: 0.95,
                })
                .collect();
            aligned.push(timings);
        }
        Ok(aligned)
    }
}

/// Mock translator wrapping the input text with the target language tag
#[derive(Debug)]
struct MockTranslator {
    model_id: String,
    factory: MockEngineFactory,
}

impl Drop for MockTranslator {
    fn drop(&mut self) {
        self.factory.record("unload", "translator", &self.model_id);
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        target_language: &str,
        _deterministic: bool,
    ) -> Result<String, EngineError> {
        let count = self.factory.translate_count.fetch_add(1, Ordering::SeqCst);

        if text.contains(UNTRANSLATABLE_MARKER) {
            return Err(EngineError::InferenceFailed(
                "simulated persistent translation failure".to_string(),
            ));
        }
        if let MockBehavior::FlakyTranslation { fail_first } = self.factory.behavior {
            if count < fail_first {
                return Err(EngineError::InferenceFailed(format!(
                    "simulated transient failure (call #{})",
                    count + 1
                )));
            }
        }
        self.factory.simulate_inference().await?;

        Ok(format!("[{}] {}", target_language, text))
    }
}

/// Mock dictionary lookup returning a fixed-shape structured result
#[derive(Debug)]
struct MockLookup {
    model_id: String,
    factory: MockEngineFactory,
}

impl Drop for MockLookup {
    fn drop(&mut self) {
        self.factory.record("unload", "lookup", &self.model_id);
    }
}

#[async_trait]
impl DictionaryLookup for MockLookup {
    async fn lookup(
        &self,
        word: &str,
        context: Option<&str>,
        target_language: &str,
    ) -> Result<LookupResult, EngineError> {
        self.factory.simulate_inference().await?;

        let mut meanings = vec![format!("[{}] primary sense of '{}'", target_language, word)];
        if let Some(sentence) = context {
            meanings.push(format!(
                "[{}] sense of '{}' as used in: {}",
                target_language, word, sentence
            ));
        }

        Ok(LookupResult {
            word: word.to_string(),
            part_of_speech: "noun".to_string(),
            meanings,
            example_sentence: Some(format!("An example sentence with '{}'.", word)),
        })
    }
}
