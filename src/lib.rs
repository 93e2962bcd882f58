/*!
 * # LingoCap - subtitle generation and translation backend
 *
 * A Rust library powering a local inference backend that turns video files
 * into time-aligned subtitle tracks and supports dictionary lookups.
 *
 * ## Features
 *
 * - Extract audio from video files and transcribe it with an ASR model
 * - Refine word-level timestamps with a forced-alignment model
 * - Translate transcripts into a target language, one segment at a time
 * - Stream job progress over SSE, with full replay on reconnect
 * - Swap the model behind any inference role at runtime
 * - Cached dictionary lookups for single words
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management and model selection
 * - `subtitle_processor`: Subtitle data model and SRT serialization
 * - `engines`: Inference engine traits and the mock factory
 * - `model_manager`: Single-active-model lifecycle per inference role
 * - `pipeline`: Transcription and translation job orchestration
 * - `progress`: Append-only progress event logs with live subscription
 * - `audio_extractor`: ffmpeg-backed audio track extraction
 * - `lookup`: Dictionary lookup service with a bounded LRU cache
 * - `server`: HTTP and SSE surface
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod audio_extractor;
pub mod engines;
pub mod errors;
pub mod language_utils;
pub mod lookup;
pub mod model_manager;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod subtitle_processor;

// Re-export main types for easier usage
pub use app_config::{Config, ModelRole};
pub use errors::{AppError, AppResult, EngineError};
pub use language_utils::{get_language_name, language_codes_match, normalize_language_hint};
pub use model_manager::ModelManager;
pub use pipeline::PipelineService;
pub use progress::{EventLog, ProgressEvent};
pub use subtitle_processor::{SubtitleEntry, SubtitleTrack};
