/*!
 * Job orchestration for the transcription and translation pipelines.
 *
 * The pipeline service owns the job store. At most one transcription job and
 * one translation job run at a time; submitting a second job of the same
 * kind while one is in flight returns a busy error. Each job appends to its
 * own event log, which the HTTP layer streams to clients, and honors
 * cancellation at stage and segment boundaries.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_config::Config;
use crate::audio_extractor::AudioExtractor;
use crate::errors::{AppError, AppResult};
use crate::language_utils::normalize_language_hint;
use crate::model_manager::ModelManager;
use crate::progress::{stage, EventLog, ProgressEvent, SegmentPayload};
use crate::subtitle_processor::{
    transcript_output_path, translation_output_path, SubtitleEntry, SubtitleTrack,
};

/// Retries per segment after the first failed translation attempt
const TRANSLATE_MAX_RETRIES: usize = 2;

/// Base delay before a translation retry, doubled per attempt with jitter
const TRANSLATE_RETRY_BASE_MS: u64 = 250;

/// How often the retention sweeper looks for expired jobs
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// The two job kinds, each limited to one in-flight job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Transcribe,
    Translate,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Transcribe => write!(f, "transcribe"),
            JobKind::Translate => write!(f, "translate"),
        }
    }
}

/// A submitted job and its progress log
#[derive(Debug)]
pub struct Job {
    /// Unique job id
    pub id: Uuid,
    /// Job kind
    pub kind: JobKind,
    /// Progress event log, streamed to clients
    pub log: EventLog,
    cancel: CancellationToken,
    finished_at: RwLock<Option<Instant>>,
}

impl Job {
    fn new(kind: JobKind) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind,
            log: EventLog::new(),
            cancel: CancellationToken::new(),
            finished_at: RwLock::new(None),
        })
    }

    /// Request cancellation; the job stops at its next checkpoint
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    fn mark_finished(&self) {
        *self.finished_at.write() = Some(Instant::now());
    }

    fn expired(&self, retention: Duration) -> bool {
        self.finished_at
            .read()
            .is_some_and(|at| at.elapsed() >= retention)
    }
}

/// Parameters for a transcription job
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeRequest {
    /// Path to the input video file
    pub video_path: PathBuf,
    /// Optional source language hint for the recognizer
    #[serde(default, rename = "language")]
    pub language_hint: Option<String>,
}

/// Parameters for a translation job
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateRequest {
    /// Path to the source transcript (SRT)
    #[serde(rename = "srt_path")]
    pub subtitle_path: PathBuf,
    /// Source language of the transcript, defaults to English
    #[serde(default)]
    pub source_language: Option<String>,
    /// Target language, defaults to the configured one
    #[serde(default)]
    pub target_language: Option<String>,
}

/// Orchestrates pipeline jobs over the model manager and audio extractor
pub struct PipelineService {
    manager: Arc<ModelManager>,
    extractor: Arc<dyn AudioExtractor>,
    config: Arc<RwLock<Config>>,
    jobs: Mutex<HashMap<Uuid, Arc<Job>>>,
}

impl PipelineService {
    pub fn new(
        manager: Arc<ModelManager>,
        extractor: Arc<dyn AudioExtractor>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            manager,
            extractor,
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a job by id
    pub fn job(&self, id: Uuid) -> AppResult<Arc<Job>> {
        self.jobs
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("unknown job id: {}", id)))
    }

    /// Cancel a job; a no-op when the job already finished
    pub fn cancel(&self, id: Uuid) -> AppResult<()> {
        let job = self.job(id)?;
        if !job.log.is_closed() {
            info!("Cancellation requested for {} job {}", job.kind, job.id);
            job.request_cancel();
        }
        Ok(())
    }

    /// Submit a transcription job
    ///
    /// Validates the input up front; validation failures are returned
    /// directly instead of creating a job.
    pub fn submit_transcribe(self: &Arc<Self>, request: TranscribeRequest) -> AppResult<Arc<Job>> {
        if !request.video_path.is_file() {
            return Err(AppError::InvalidInput(format!(
                "video file not found: {}",
                request.video_path.display()
            )));
        }
        let hint = match request.language_hint.as_deref() {
            Some(code) => Some(
                normalize_language_hint(code)
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?,
            ),
            None => None,
        };

        let job = self.register(JobKind::Transcribe)?;
        let service = Arc::clone(self);
        let task_job = Arc::clone(&job);
        tokio::spawn(async move {
            let result = service
                .run_transcribe(&task_job, &request.video_path, hint.as_deref())
                .await;
            service.finish(&task_job, result);
        });
        Ok(job)
    }

    /// Submit a translation job over an existing transcript
    ///
    /// The source file is parsed up front; a file that is not a valid
    /// subtitle track is rejected here, before any job exists.
    pub fn submit_translate(self: &Arc<Self>, request: TranslateRequest) -> AppResult<Arc<Job>> {
        if !request.subtitle_path.is_file() {
            return Err(AppError::InvalidInput(format!(
                "subtitle file not found: {}",
                request.subtitle_path.display()
            )));
        }
        let (source_raw, target_raw) = {
            let config = self.config.read();
            let source = request
                .source_language
                .or_else(|| config.source_language.clone())
                .unwrap_or_else(|| "en".to_string());
            let target = request
                .target_language
                .unwrap_or_else(|| config.target_language.clone());
            (source, target)
        };
        let source = normalize_language_hint(&source_raw)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let target = normalize_language_hint(&target_raw)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let track = SubtitleTrack::from_srt_file(&request.subtitle_path, &source)
            .map_err(|e| AppError::InvalidInput(format!("{:#}", e)))?;

        let job = self.register(JobKind::Translate)?;
        let service = Arc::clone(self);
        let task_job = Arc::clone(&job);
        tokio::spawn(async move {
            let result = service.run_translate(&task_job, track, &target).await;
            service.finish(&task_job, result);
        });
        Ok(job)
    }

    /// Register a job, enforcing one in-flight job per kind
    fn register(&self, kind: JobKind) -> AppResult<Arc<Job>> {
        let mut jobs = self.jobs.lock();
        if jobs.values().any(|j| j.kind == kind && !j.log.is_closed()) {
            return Err(AppError::Busy(format!(
                "a {} job is already running",
                kind
            )));
        }
        let job = Job::new(kind);
        jobs.insert(job.id, Arc::clone(&job));
        info!("Registered {} job {}", kind, job.id);
        Ok(job)
    }

    /// Record the terminal event for a finished job task
    fn finish(&self, job: &Arc<Job>, result: AppResult<()>) {
        if let Err(err) = result {
            let last_stage = job
                .log
                .last()
                .map(|e| e.stage)
                .unwrap_or_else(|| stage::EXTRACT.to_string());
            match err {
                AppError::CancelledByUser => {
                    info!("{} job {} cancelled", job.kind, job.id);
                    job.log.push(ProgressEvent::cancelled(&last_stage));
                }
                err => {
                    error!("{} job {} failed: {}", job.kind, job.id, err);
                    job.log
                        .push(ProgressEvent::error(&last_stage, err.kind(), err.to_string()));
                }
            }
        }
        job.mark_finished();
    }

    fn checkpoint(&self, job: &Job) -> AppResult<()> {
        if job.cancel.is_cancelled() {
            return Err(AppError::CancelledByUser);
        }
        Ok(())
    }

    async fn run_transcribe(
        &self,
        job: &Arc<Job>,
        video_path: &Path,
        language_hint: Option<&str>,
    ) -> AppResult<()> {
        job.log.push(
            ProgressEvent::stage(stage::EXTRACT, 0).with_message("extracting audio track"),
        );
        let audio = self.extractor.extract(video_path).await?;
        self.checkpoint(job)?;
        job.log.push(ProgressEvent::stage(stage::EXTRACT, 10));

        job.log.push(
            ProgressEvent::stage(stage::TRANSCRIBE, 10).with_message("running speech recognition"),
        );
        let segments = {
            let lease = self.manager.acquire_recognizer().await?;
            lease
                .engine()
                .transcribe(audio.path(), language_hint)
                .await?
        };
        self.checkpoint(job)?;
        if segments.is_empty() {
            return Err(AppError::InferenceFailure(
                "recognizer produced no segments".to_string(),
            ));
        }
        let total = segments.len();
        for (index, segment) in segments.iter().enumerate() {
            job.log.push(
                ProgressEvent::stage(stage::TRANSCRIBE, scale(index + 1, total, 10, 60))
                    .with_segment(SegmentPayload {
                        index: index + 1,
                        start_time_ms: segment.start_time_ms,
                        end_time_ms: segment.end_time_ms,
                        text: segment.text.clone(),
                        words: None,
                    }),
            );
        }

        job.log
            .push(ProgressEvent::stage(stage::ALIGN, 60).with_message("refining word timings"));
        let aligned = {
            let lease = self.manager.acquire_aligner().await?;
            lease.engine().align(audio.path(), &segments).await?
        };
        self.checkpoint(job)?;
        if aligned.len() != total {
            return Err(AppError::InferenceFailure(format!(
                "aligner returned {} segments for {} inputs",
                aligned.len(),
                total
            )));
        }
        for (index, (segment, words)) in segments.iter().zip(aligned.iter()).enumerate() {
            job.log.push(
                ProgressEvent::stage(stage::ALIGN, scale(index + 1, total, 60, 90)).with_segment(
                    SegmentPayload {
                        index: index + 1,
                        start_time_ms: segment.start_time_ms,
                        end_time_ms: segment.end_time_ms,
                        text: segment.text.clone(),
                        words: Some(words.clone()),
                    },
                ),
            );
        }

        self.checkpoint(job)?;
        job.log
            .push(ProgressEvent::stage(stage::FINALIZE, 90).with_message("writing transcript"));
        let entries: Vec<SubtitleEntry> = segments
            .iter()
            .zip(aligned)
            .enumerate()
            .map(|(i, (segment, words))| {
                let mut entry = SubtitleEntry::new(
                    i + 1,
                    segment.start_time_ms,
                    segment.end_time_ms,
                    segment.text.clone(),
                );
                entry.words = words;
                entry
            })
            .collect();
        let output_path = transcript_output_path(video_path);
        let track = SubtitleTrack {
            source_file: output_path.clone(),
            entries,
            language: language_hint.unwrap_or("und").to_string(),
        };
        track
            .write_to_srt(&output_path)
            .map_err(|e| AppError::IoFailure(format!("{:#}", e)))?;

        info!(
            "Transcription job {} wrote {} entries to {}",
            job.id,
            track.entries.len(),
            output_path.display()
        );
        job.log.push(ProgressEvent::done(stage::FINALIZE, output_path));
        Ok(())
    }

    async fn run_translate(
        &self,
        job: &Arc<Job>,
        track: SubtitleTrack,
        target_language: &str,
    ) -> AppResult<()> {
        let source_language = track.language.as_str();
        let total = track.entries.len();
        job.log.push(
            ProgressEvent::stage(stage::TRANSLATE, 5)
                .with_message(format!("translating {} segments", total)),
        );

        let mut translated_entries = Vec::with_capacity(total);
        let mut untranslated = Vec::new();

        for (index, entry) in track.entries.iter().enumerate() {
            self.checkpoint(job)?;

            // The lease is re-taken per segment so a queued model switch
            // can run between segments
            let text = match self
                .translate_segment(&entry.text, source_language, target_language)
                .await
            {
                Ok(text) => text,
                Err(err) => {
                    warn!(
                        "Job {}: segment {} left untranslated after {} retries: {}",
                        job.id, entry.seq_num, TRANSLATE_MAX_RETRIES, err
                    );
                    untranslated.push(entry.seq_num);
                    entry.text.clone()
                }
            };

            job.log.push(
                ProgressEvent::stage(stage::TRANSLATE, scale(index + 1, total, 5, 95))
                    .with_segment(SegmentPayload {
                        index: entry.seq_num,
                        start_time_ms: entry.start_time_ms,
                        end_time_ms: entry.end_time_ms,
                        text: text.clone(),
                        words: None,
                    }),
            );
            translated_entries.push(SubtitleEntry::new(
                entry.seq_num,
                entry.start_time_ms,
                entry.end_time_ms,
                text,
            ));
        }

        self.checkpoint(job)?;
        job.log
            .push(ProgressEvent::stage(stage::FINALIZE, 95).with_message("writing translation"));
        let output_path = translation_output_path(&track.source_file, target_language);
        let translated = SubtitleTrack {
            source_file: output_path.clone(),
            entries: translated_entries,
            language: target_language.to_string(),
        };
        translated
            .write_to_srt(&output_path)
            .map_err(|e| AppError::IoFailure(format!("{:#}", e)))?;

        if untranslated.is_empty() {
            info!(
                "Translation job {} wrote {} entries to {}",
                job.id,
                total,
                output_path.display()
            );
            job.log.push(ProgressEvent::done(stage::FINALIZE, output_path));
        } else {
            warn!(
                "Translation job {} finished with {} untranslated segments",
                job.id,
                untranslated.len()
            );
            job.log.push(ProgressEvent::done_with_warnings(
                stage::FINALIZE,
                output_path,
                untranslated,
            ));
        }
        Ok(())
    }

    /// Translate one segment with bounded retries and jittered backoff
    async fn translate_segment(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> AppResult<String> {
        let mut attempt = 0;
        loop {
            let result = {
                let lease = self.manager.acquire_translator().await?;
                lease
                    .engine()
                    .translate(text, source_language, target_language, true)
                    .await
            };
            match result {
                Ok(translated) => return Ok(translated),
                Err(err) if attempt < TRANSLATE_MAX_RETRIES => {
                    attempt += 1;
                    let backoff = TRANSLATE_RETRY_BASE_MS * (1 << attempt);
                    let jitter = rand::rng().random_range(0..TRANSLATE_RETRY_BASE_MS);
                    debug!(
                        "Translation attempt {} failed, retrying in {}ms: {}",
                        attempt,
                        backoff + jitter,
                        err
                    );
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Drop finished jobs that outlived the configured retention window
    pub fn sweep_expired(&self) {
        let retention = Duration::from_secs(self.config.read().job_retention_secs);
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(retention));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Retention sweep removed {} finished jobs", removed);
        }
    }

    /// Spawn the periodic retention sweeper
    pub fn spawn_retention_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                service.sweep_expired();
            }
        })
    }

    /// Number of jobs currently retained (running and finished)
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl std::fmt::Debug for PipelineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineService")
            .field("jobs", &self.jobs.lock().len())
            .finish_non_exhaustive()
    }
}

/// Map `done`/`total` progress into the [from, to] percent range
fn scale(done: usize, total: usize, from: u8, to: u8) -> u8 {
    if total == 0 {
        return to;
    }
    let span = (to - from) as usize;
    from + (span * done / total) as u8
}
