/*!
 * End-to-end tests for transcription and translation jobs running over
 * mock engines and the stub audio extractor
 */

use std::time::Duration;

use lingocap::engines::mock::{MockEngineFactory, UNTRANSLATABLE_MARKER};
use lingocap::pipeline::{TranscribeRequest, TranslateRequest};
use lingocap::progress::{status, ProgressEvent};
use lingocap::subtitle_processor::SubtitleTrack;

use crate::common;

fn assert_monotonic_percent(events: &[ProgressEvent]) {
    let mut last = 0u8;
    for event in events {
        assert!(
            event.percent >= last,
            "percent went backwards: {} after {}",
            event.percent,
            last
        );
        last = event.percent;
    }
}

#[tokio::test]
async fn test_transcribe_happyPath_shouldWriteTranscriptAndStreamStages() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(&temp_dir.path().to_path_buf(), "clip.mp4").unwrap();

    let job = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video.clone(),
            language_hint: Some("en".to_string()),
        })
        .unwrap();
    let events = common::collect_events(&job).await;

    assert_monotonic_percent(&events);
    assert_eq!(events.first().unwrap().stage, "extract");
    let terminal = events.last().unwrap();
    assert_eq!(terminal.status.as_deref(), Some(status::DONE));
    assert_eq!(terminal.percent, 100);

    // One segment event per script entry from transcription and alignment
    let transcribe_segments = events
        .iter()
        .filter(|e| e.stage == "transcribe" && e.segment.is_some())
        .count();
    let align_segments: Vec<_> = events
        .iter()
        .filter(|e| e.stage == "align" && e.segment.is_some())
        .collect();
    assert_eq!(transcribe_segments, 3);
    assert_eq!(align_segments.len(), 3);
    assert!(align_segments
        .iter()
        .all(|e| e.segment.as_ref().unwrap().words.is_some()));

    // Segment indices count from 1, matching SRT sequence numbers
    let align_indices: Vec<usize> = align_segments
        .iter()
        .map(|e| e.segment.as_ref().unwrap().index)
        .collect();
    assert_eq!(align_indices, vec![1, 2, 3]);

    let output = temp_dir.path().join("clip.original.srt");
    assert!(output.exists());
    assert_eq!(terminal.output_path.as_deref(), Some(output.as_path()));
    let track = SubtitleTrack::from_srt_file(&output, "en").unwrap();
    assert_eq!(track.entries.len(), 3);
    assert!(track.entries[0].text.contains("Hello"));
}

#[tokio::test]
async fn test_transcribe_withMissingVideo_shouldRejectBeforeCreatingJob() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());

    let err = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: "/nonexistent/clip.mp4".into(),
            language_hint: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
    assert_eq!(pipeline.job_count(), 0);
}

#[tokio::test]
async fn test_transcribe_withInvalidLanguageHint_shouldReject() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(&temp_dir.path().to_path_buf(), "clip.mp4").unwrap();

    let err = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video,
            language_hint: Some("klingon".to_string()),
        })
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[tokio::test]
async fn test_transcribe_whileAnotherRuns_shouldReturnBusy() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::slow(500));
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(&temp_dir.path().to_path_buf(), "clip.mp4").unwrap();

    let first = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video.clone(),
            language_hint: None,
        })
        .unwrap();

    let err = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video.clone(),
            language_hint: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), "Busy");

    // Once the first job finishes, a new one is accepted
    common::collect_events(&first).await;
    assert!(pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video,
            language_hint: None,
        })
        .is_ok());
}

#[tokio::test]
async fn test_transcribe_cancelled_shouldEndStreamWithoutOutput() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::slow(500));
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(&temp_dir.path().to_path_buf(), "clip.mp4").unwrap();

    let job = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video,
            language_hint: None,
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline.cancel(job.id).unwrap();

    let events = common::collect_events(&job).await;
    let terminal = events.last().unwrap();
    assert_eq!(terminal.status.as_deref(), Some(status::CANCELLED));
    assert!(!temp_dir.path().join("clip.original.srt").exists());
}

#[tokio::test]
async fn test_cancel_withUnknownJobId_shouldReturnInvalidInput() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let err = pipeline.cancel(uuid::Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[tokio::test]
async fn test_cancel_onFinishedJob_shouldBeNoOp() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: None,
        })
        .unwrap();
    common::collect_events(&job).await;

    assert!(pipeline.cancel(job.id).is_ok());
    assert_eq!(
        job.log.last().unwrap().status.as_deref(),
        Some(status::DONE)
    );
}

#[tokio::test]
async fn test_translate_happyPath_shouldWriteTranslatedTrack() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: Some("en".to_string()),
            target_language: Some("ja".to_string()),
        })
        .unwrap();
    let events = common::collect_events(&job).await;

    assert_monotonic_percent(&events);
    let terminal = events.last().unwrap();
    assert_eq!(terminal.status.as_deref(), Some(status::DONE));

    let segment_indices: Vec<usize> = events
        .iter()
        .filter_map(|e| e.segment.as_ref().map(|s| s.index))
        .collect();
    assert_eq!(segment_indices, vec![1, 2, 3]);

    let output = temp_dir.path().join("show.ja.srt");
    assert!(output.exists());
    assert_eq!(terminal.output_path.as_deref(), Some(output.as_path()));
    let track = SubtitleTrack::from_srt_file(&output, "ja").unwrap();
    assert_eq!(track.entries.len(), 3);
    assert!(track.entries.iter().all(|e| e.text.starts_with("[ja] ")));
}

#[tokio::test]
async fn test_translate_withFailingSegment_shouldDegradeAndKeepOriginalText() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let content = format!(
        "1\n00:00:01,000 --> 00:00:02,000\nFirst line.\n\n2\n00:00:03,000 --> 00:00:04,000\nBroken {} line.\n\n3\n00:00:05,000 --> 00:00:06,000\nThird line.\n",
        UNTRANSLATABLE_MARKER
    );
    let srt =
        common::create_test_file(&temp_dir.path().to_path_buf(), "show.srt", &content).unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: Some("ja".to_string()),
        })
        .unwrap();
    let events = common::collect_events(&job).await;

    let terminal = events.last().unwrap();
    assert_eq!(
        terminal.status.as_deref(),
        Some(status::DONE_WITH_WARNINGS)
    );
    // Warning indices are 1-based SRT sequence numbers
    assert_eq!(terminal.untranslated_indices, Some(vec![2]));
    assert!(terminal.output_path.is_some());

    let track =
        SubtitleTrack::from_srt_file(temp_dir.path().join("show.ja.srt"), "ja").unwrap();
    assert_eq!(track.entries.len(), 3);
    assert!(track.entries[0].text.starts_with("[ja] "));
    assert!(track.entries[1].text.contains(UNTRANSLATABLE_MARKER));
    assert!(track.entries[2].text.starts_with("[ja] "));
}

#[tokio::test]
async fn test_translate_withTransientFailures_shouldRetryAndSucceed() {
    let factory = MockEngineFactory::flaky_translation(2);
    let (pipeline, _, _) = common::build_test_service(factory.clone());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: Some("ja".to_string()),
        })
        .unwrap();
    let events = common::collect_events(&job).await;

    assert_eq!(
        events.last().unwrap().status.as_deref(),
        Some(status::DONE)
    );
    // Two failed attempts on the first segment plus one call per segment
    assert_eq!(factory.translate_calls(), 5);
}

#[tokio::test]
async fn test_translate_withUnparseableFile_shouldRejectBeforeCreatingJob() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_file(
        &temp_dir.path().to_path_buf(),
        "broken.srt",
        "this is not an srt file\n",
    )
    .unwrap();

    let err = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: None,
        })
        .unwrap_err();

    assert_eq!(err.kind(), "InvalidInput");
    assert_eq!(pipeline.job_count(), 0);
}

#[tokio::test]
async fn test_transcribe_withFailingInference_shouldStreamStructuredError() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::failing_inference());
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(&temp_dir.path().to_path_buf(), "clip.mp4").unwrap();

    let job = pipeline
        .submit_transcribe(TranscribeRequest {
            video_path: video,
            language_hint: None,
        })
        .unwrap();
    let events = common::collect_events(&job).await;

    let terminal = events.last().unwrap();
    assert_eq!(terminal.status.as_deref(), Some(status::ERROR));
    let error = terminal.error.as_ref().unwrap();
    assert_eq!(error.kind, "InferenceFailure");
    assert!(!error.message.is_empty());
    assert!(terminal.output_path.is_none());
}

#[tokio::test]
async fn test_subscribe_afterCompletion_shouldReplayFullHistory() {
    let (pipeline, _, _) = common::build_test_service(MockEngineFactory::working());
    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: None,
        })
        .unwrap();
    let live = common::collect_events(&job).await;
    let replay = common::collect_events(&pipeline.job(job.id).unwrap()).await;

    assert_eq!(live, replay);
}

#[tokio::test]
async fn test_sweep_expired_shouldDropFinishedJobsAfterRetention() {
    let (pipeline, _, config) = common::build_test_service(MockEngineFactory::working());
    config.write().job_retention_secs = 0;

    let temp_dir = common::create_temp_dir().unwrap();
    let srt = common::create_test_subtitle(&temp_dir.path().to_path_buf(), "show.srt").unwrap();

    let job = pipeline
        .submit_translate(TranslateRequest {
            subtitle_path: srt,
            source_language: None,
            target_language: None,
        })
        .unwrap();
    common::collect_events(&job).await;

    pipeline.sweep_expired();
    assert_eq!(pipeline.job_count(), 0);
    assert!(pipeline.job(job.id).is_err());
}
