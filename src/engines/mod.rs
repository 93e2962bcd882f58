/*!
 * Inference engine traits for the four model roles.
 *
 * This module defines the interfaces that engine implementations must follow:
 * - `SpeechRecognizer`: audio to coarse timed transcript segments
 * - `ForcedAligner`: word-level timestamp refinement within segments
 * - `Translator`: single-segment text translation
 * - `DictionaryLookup`: structured word lookups
 *
 * Engines are produced by an `EngineFactory`, which the model manager calls
 * when a role's model is loaded. Dropping the returned handle releases the
 * engine's resources.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::subtitle_processor::WordTiming;

/// A coarse transcript segment produced by speech recognition
///
/// Segment timestamps are milliseconds from the start of the audio. Word
/// timings are added later by the forced aligner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedSegment {
    /// Segment start in milliseconds
    pub start_time_ms: u64,
    /// Segment end in milliseconds
    pub end_time_ms: u64,
    /// Transcribed text
    pub text: String,
}

/// Structured result of a dictionary lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupResult {
    /// The word that was looked up
    pub word: String,
    /// Grammatical category ("noun", "verb", ...)
    pub part_of_speech: String,
    /// Definitions in the requested target language
    pub meanings: Vec<String>,
    /// Optional example sentence using the word
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_sentence: Option<String>,
}

/// Speech recognition engine (audio file to timed transcript segments)
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + Debug {
    /// Transcribe a 16kHz mono WAV file into coarse timed segments
    ///
    /// # Arguments
    /// * `audio_path` - Path to the extracted audio file
    /// * `language_hint` - Optional normalized ISO 639-1 source language code
    async fn transcribe(
        &self,
        audio_path: &Path,
        language_hint: Option<&str>,
    ) -> Result<Vec<RecognizedSegment>, EngineError>;
}

/// Forced alignment engine (word-level timestamps within known segments)
#[async_trait]
pub trait ForcedAligner: Send + Sync + Debug {
    /// Produce word timings for each segment, one `Vec<WordTiming>` per
    /// input segment, in the same order
    async fn align(
        &self,
        audio_path: &Path,
        segments: &[RecognizedSegment],
    ) -> Result<Vec<Vec<WordTiming>>, EngineError>;
}

/// Translation engine for a single subtitle segment
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate one segment's text into the target language
    ///
    /// With `deterministic` set, implementations must decode greedily so the
    /// same input always yields the same translation; retries after a
    /// transient failure then cannot produce a different result than the
    /// first attempt would have. Subtitle jobs always pass `true`.
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        deterministic: bool,
    ) -> Result<String, EngineError>;
}

/// Dictionary lookup engine
#[async_trait]
pub trait DictionaryLookup: Send + Sync + Debug {
    /// Look up a word, optionally disambiguated by the sentence it came from
    async fn lookup(
        &self,
        word: &str,
        context: Option<&str>,
        target_language: &str,
    ) -> Result<LookupResult, EngineError>;
}

/// Factory that instantiates engines for a given model id
///
/// Loading may take seconds for real weights, so implementations should do
/// heavy work off the async runtime (the mock factory just sleeps). A
/// returned engine holds the model's resources until dropped.
#[async_trait]
pub trait EngineFactory: Send + Sync + Debug {
    /// Load a speech recognition engine
    async fn load_recognizer(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn SpeechRecognizer>, EngineError>;

    /// Load a forced alignment engine
    async fn load_aligner(&self, model_id: &str) -> Result<Arc<dyn ForcedAligner>, EngineError>;

    /// Load a translation engine
    async fn load_translator(&self, model_id: &str) -> Result<Arc<dyn Translator>, EngineError>;

    /// Load a dictionary lookup engine
    async fn load_lookup(&self, model_id: &str) -> Result<Arc<dyn DictionaryLookup>, EngineError>;
}

pub mod mock;
