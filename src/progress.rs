/*!
 * Progress event log for long-running jobs.
 *
 * Every job appends `ProgressEvent`s to an in-memory log. Subscribers get a
 * replay of everything already logged followed by live events, so a client
 * that reconnects mid-job sees the full history. A stream ends when the log
 * reaches a terminal event (done, done_with_warnings, error, cancelled).
 */

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::subtitle_processor::WordTiming;

/// Pipeline stage names used in progress events
pub mod stage {
    pub const EXTRACT: &str = "extract";
    pub const TRANSCRIBE: &str = "transcribe";
    pub const ALIGN: &str = "align";
    pub const TRANSLATE: &str = "translate";
    pub const FINALIZE: &str = "finalize";
}

/// Terminal status values carried by the final event of a job
pub mod status {
    pub const DONE: &str = "done";
    pub const DONE_WITH_WARNINGS: &str = "done_with_warnings";
    pub const ERROR: &str = "error";
    pub const CANCELLED: &str = "cancelled";
}

/// A segment attached to a progress event, emitted as soon as the stage
/// that produced it completes the segment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentPayload {
    /// One-based segment index, matching the SRT sequence number
    pub index: usize,
    /// Segment start in milliseconds
    pub start_time_ms: u64,
    /// Segment end in milliseconds
    pub end_time_ms: u64,
    /// Segment text (source or translated, depending on the stage)
    pub text: String,
    /// Word timings, present on align-stage events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordTiming>>,
}

/// Error details carried by an error terminal event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    /// Stable error kind string
    pub kind: String,
    /// Human-readable description
    pub message: String,
}

/// One event in a job's progress log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    /// Current stage name
    pub stage: String,
    /// Overall percent complete, monotonically non-decreasing per job
    pub percent: u8,
    /// Optional human-readable status line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Segment produced by this step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<SegmentPayload>,
    /// Terminal status, present only on the final event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Written output file, present on successful terminals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Error details, present only on error terminals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    /// One-based indices of segments left untranslated, on done_with_warnings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub untranslated_indices: Option<Vec<usize>>,
}

impl ProgressEvent {
    /// A plain stage/percent event
    pub fn stage(stage: &str, percent: u8) -> Self {
        Self {
            stage: stage.to_string(),
            percent,
            message: None,
            segment: None,
            status: None,
            output_path: None,
            error: None,
            untranslated_indices: None,
        }
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a segment payload
    pub fn with_segment(mut self, segment: SegmentPayload) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Successful terminal event carrying the written output path
    pub fn done(stage: &str, output_path: impl Into<PathBuf>) -> Self {
        let mut event = Self::stage(stage, 100);
        event.status = Some(status::DONE.to_string());
        event.output_path = Some(output_path.into());
        event
    }

    /// Terminal event for a job that finished with untranslated segments
    pub fn done_with_warnings(
        stage: &str,
        output_path: impl Into<PathBuf>,
        untranslated: Vec<usize>,
    ) -> Self {
        let mut event = Self::stage(stage, 100);
        event.status = Some(status::DONE_WITH_WARNINGS.to_string());
        event.output_path = Some(output_path.into());
        event.untranslated_indices = Some(untranslated);
        event
    }

    /// Error terminal event
    pub fn error(stage: &str, kind: &str, message: impl Into<String>) -> Self {
        let mut event = Self::stage(stage, 0);
        event.status = Some(status::ERROR.to_string());
        event.error = Some(ErrorPayload {
            kind: kind.to_string(),
            message: message.into(),
        });
        event
    }

    /// Cancellation terminal event
    pub fn cancelled(stage: &str) -> Self {
        let mut event = Self::stage(stage, 0);
        event.status = Some(status::CANCELLED.to_string());
        event
    }

    /// True when this event ends the job's stream
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }
}

/// Append-only event log with replay-then-live subscription
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<ProgressEvent>>>,
    /// Published length of `events`; subscribers wait on this
    len_tx: watch::Sender<usize>,
}

impl EventLog {
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            len_tx,
        }
    }

    /// Append an event, clamping percent so it never goes backwards
    pub fn push(&self, mut event: ProgressEvent) {
        let mut events = self.events.write();
        if let Some(last) = events.last() {
            if last.is_terminal() {
                // Nothing may follow a terminal event
                return;
            }
            if event.percent < last.percent {
                event.percent = last.percent;
            }
        }
        events.push(event);
        let len = events.len();
        drop(events);
        let _ = self.len_tx.send(len);
    }

    /// Snapshot of all events logged so far
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Last event, if any
    pub fn last(&self) -> Option<ProgressEvent> {
        self.events.read().last().cloned()
    }

    /// True once a terminal event has been logged
    pub fn is_closed(&self) -> bool {
        self.events.read().last().is_some_and(|e| e.is_terminal())
    }

    /// Subscribe to the log: replays everything already appended, then
    /// yields live events, ending after the terminal event
    ///
    /// The returned stream owns its handle on the log, so it outlives both
    /// `&self` and the `EventLog` it came from.
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static + use<> {
        let events = Arc::clone(&self.events);
        let len_rx = self.len_tx.subscribe();

        futures::stream::unfold(0usize, move |next_index| {
            let events = Arc::clone(&events);
            let mut len_rx = len_rx.clone();
            async move {
                loop {
                    {
                        let guard = events.read();
                        if next_index < guard.len() {
                            let event = guard[next_index].clone();
                            return Some((event, next_index + 1));
                        }
                        if guard.last().is_some_and(|e| e.is_terminal()) {
                            return None;
                        }
                    }
                    // Wait for the log to grow; a closed sender means the
                    // job handle is gone, end the stream
                    if len_rx.changed().await.is_err() {
                        return None;
                    }
                }
            }
        })
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
