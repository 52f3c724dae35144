//! Render lifecycle integration tests.
//!
//! These tests run the orchestrator end to end with the mock renderer and encoder:
//! - Single-worker and parallel renders
//! - GIF palette passes and image sequences
//! - Readiness delays, retries and timeouts
//! - Audio mixing and its non-fatal failure
//! - Event stream ordering

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use framecast_core::{
    testing::{fixtures, MockDelay, MockEncoder, MockLauncher},
    Codec, DriverTimeouts, EncodeInput, EncodeMode, EventReporter, OrchestratorSettings,
    ProgressEvent, RenderError, RenderJobSpec, RenderOrchestrator,
};

/// Test helper holding the orchestrator and its mocks.
struct TestHarness {
    orchestrator: RenderOrchestrator,
    launcher: MockLauncher,
    encoder: MockEncoder,
    out_dir: TempDir,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_timeouts(DriverTimeouts {
            load: Duration::from_secs(5),
            readiness: Duration::from_secs(5),
            paint: Duration::from_secs(5),
        })
    }

    fn with_timeouts(timeouts: DriverTimeouts) -> Self {
        let out_dir = TempDir::new().expect("Failed to create output dir");
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let launcher = MockLauncher::new();
        let encoder = MockEncoder::new();

        let orchestrator = RenderOrchestrator::new(
            Arc::new(launcher.clone()),
            Arc::new(encoder.clone()),
            OrchestratorSettings::new(temp_dir.path()).with_timeouts(timeouts),
        );

        Self {
            orchestrator,
            launcher,
            encoder,
            out_dir,
            temp_dir,
        }
    }

    fn job(&self, frames: u64) -> RenderJobSpec {
        fixtures::job(self.out_dir.path(), frames)
    }

    /// Renders `job` and collects every emitted event.
    async fn render_collect(
        &self,
        job: &RenderJobSpec,
    ) -> (Result<framecast_core::RenderOutcome, RenderError>, Vec<ProgressEvent>) {
        let (reporter, mut rx) = EventReporter::channel();
        let result = self.orchestrator.render_with_events(job, &reporter).await;
        drop(reporter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    fn scratch_is_clean(&self) -> bool {
        std::fs::read_dir(self.temp_dir.path())
            .map(|entries| entries.count() == 0)
            .unwrap_or(true)
    }
}

fn frame_lines(content: &str) -> Vec<u64> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("frame "))
        .filter_map(|n| n.parse().ok())
        .collect()
}

fn progress_frames(events: &[ProgressEvent]) -> Vec<(u64, u64, u8)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress {
                frame,
                total,
                percent,
            } => Some((*frame, *total, *percent)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_single_worker_render() {
    let harness = TestHarness::new();
    let job = harness.job(60);

    let (result, events) = harness.render_collect(&job).await;
    let outcome = result.expect("render should succeed");

    assert_eq!(outcome.frames, 60);
    assert_eq!(outcome.workers, 1);
    assert_eq!(outcome.filename, "intro.mp4");

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(frame_lines(&content), (0..60).collect::<Vec<_>>());

    // Progress strictly increases and ends at (60, 60, 100).
    let progress = progress_frames(&events);
    assert_eq!(progress.len(), 60);
    for pair in progress.windows(2) {
        assert!(pair[1].0 > pair[0].0);
    }
    assert_eq!(progress.last(), Some(&(60, 60, 100)));

    assert!(matches!(events.first(), Some(ProgressEvent::Start { frames: 60, .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));

    let passes = harness.encoder.passes().await;
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].codec, Codec::H264);
    assert_eq!(passes[0].frame_count, 60);
    assert!(harness.scratch_is_clean());
}

#[tokio::test]
async fn test_parallel_render_concatenates_segments() {
    let harness = TestHarness::new();
    let job = harness.job(60).with_concurrency(3).with_muted(true);

    let (result, events) = harness.render_collect(&job).await;
    let outcome = result.expect("render should succeed");
    assert_eq!(outcome.workers, 3);

    let passes = harness.encoder.passes().await;
    let mut segments: Vec<(u64, u64)> = passes
        .iter()
        .map(|p| (p.first_frame, p.frame_count))
        .collect();
    segments.sort_unstable();
    assert_eq!(segments, vec![(0, 20), (20, 20), (40, 20)]);

    let concats = harness.encoder.concats().await;
    assert_eq!(concats.len(), 1);
    assert_eq!(concats[0].segments.len(), 3);
    assert!(concats[0].segments[0].to_string_lossy().contains("segment-000"));
    assert!(concats[0].segments[2].to_string_lossy().contains("segment-002"));

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(frame_lines(&content), (0..60).collect::<Vec<_>>());

    let progress = progress_frames(&events);
    for pair in progress.windows(2) {
        assert!(pair[1].0 > pair[0].0);
    }
    assert_eq!(progress.last(), Some(&(60, 60, 100)));

    assert_eq!(harness.launcher.captured_frames().await.len(), 60);
    assert_eq!(harness.launcher.closed_count(), 3);
    assert!(outcome.warnings.is_empty());
    assert!(harness.scratch_is_clean());
}

#[tokio::test]
async fn test_parallel_render_with_audio_warns() {
    let harness = TestHarness::new();
    harness
        .launcher
        .set_audio_tracks(vec![fixtures::music_track(0)])
        .await;
    let job = harness.job(12).with_concurrency(2);

    let (result, events) = harness.render_collect(&job).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.audio_tracks_mixed, 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(harness.encoder.muxes().await.is_empty());
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Status { message } if message.contains("Audio is not collected")
    )));
}

#[tokio::test]
async fn test_worker_count_clamped_to_frames() {
    let harness = TestHarness::new();
    let job = harness.job(2).with_concurrency(8).with_muted(true);

    let outcome = harness.orchestrator.render(&job).await.unwrap();
    assert_eq!(outcome.workers, 2);
    assert_eq!(harness.launcher.launches().await.len(), 2);
}

#[tokio::test]
async fn test_parallel_failure_aborts_job() {
    let harness = TestHarness::new();
    harness.launcher.fail_on_frame(25, "TypeError: x is undefined").await;
    let job = harness.job(60).with_concurrency(3).with_muted(true);

    let (result, events) = harness.render_collect(&job).await;
    let err = result.unwrap_err();

    match &err {
        RenderError::WorkerFailure {
            worker_index,
            frame,
            message,
        } => {
            assert_eq!(*worker_index, 1);
            assert_eq!(*frame, Some(25));
            assert!(message.contains("TypeError"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert!(harness.encoder.concats().await.is_empty());
    assert!(!job.output_path.exists());
    assert!(harness.scratch_is_clean());
}

#[tokio::test]
async fn test_gif_uses_two_passes() {
    let harness = TestHarness::new();
    let job = fixtures::gif_job(harness.out_dir.path(), 10).with_concurrency(4);

    let outcome = harness.orchestrator.render(&job).await.unwrap();
    assert_eq!(outcome.workers, 1);

    let passes = harness.encoder.passes().await;
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].mode, EncodeMode::PaletteGen);
    assert!(matches!(passes[1].mode, EncodeMode::PaletteUse { .. }));
    for pass in &passes {
        assert!(matches!(pass.input, EncodeInput::ImageSequence { start_number: 0, .. }));
    }

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(frame_lines(&content), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_single_frame_gif_still_two_passes() {
    let harness = TestHarness::new();
    let job = fixtures::gif_job(harness.out_dir.path(), 1);

    harness.orchestrator.render(&job).await.unwrap();
    assert_eq!(harness.encoder.pass_count().await, 2);
}

#[tokio::test]
async fn test_image_sequence() {
    let harness = TestHarness::new();
    let dir = harness.out_dir.path().join("stills");
    let job = RenderJobSpec::new("intro", &dir)
        .with_size(64, 36)
        .with_frames(95, 104)
        .with_sequence(true)
        .with_concurrency(3);

    let outcome = harness.orchestrator.render(&job).await.unwrap();
    assert_eq!(outcome.output_path, dir);
    assert_eq!(outcome.frames, 10);

    for frame in 95..=104 {
        let still = dir.join(format!("element-{:03}.png", frame));
        assert!(still.exists(), "{} missing", still.display());
    }
    assert_eq!(harness.encoder.pass_count().await, 0);
}

#[tokio::test]
async fn test_failed_image_sequence_leaves_no_stills() {
    let harness = TestHarness::new();
    harness.launcher.fail_on_frame(7, "image failed to decode").await;
    let dir = harness.out_dir.path().join("stills");
    let job = RenderJobSpec::new("intro", &dir)
        .with_size(64, 36)
        .with_frames(0, 9)
        .with_sequence(true);

    let err = harness.orchestrator.render(&job).await.unwrap_err();
    assert!(err.to_string().contains("frame 7"));
    assert_eq!(harness.launcher.captured_frames().await.len(), 7);
    assert!(!dir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_delays_hold_capture() {
    let harness = TestHarness::new();
    harness
        .launcher
        .add_delay(3, "font", MockDelay::ResolveAfter(Duration::from_millis(500)))
        .await;
    harness
        .launcher
        .add_delay(3, "image", MockDelay::ResolveAfter(Duration::from_millis(100)))
        .await;

    let job = harness.job(6);
    let outcome = harness.orchestrator.render(&job).await.unwrap();

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(frame_lines(&content), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_lists_labels() {
    let harness = TestHarness::with_timeouts(DriverTimeouts {
        load: Duration::from_secs(5),
        readiness: Duration::from_secs(2),
        paint: Duration::from_secs(5),
    });
    harness.launcher.add_delay(4, "hero-video", MockDelay::Never).await;

    let (result, events) = harness.render_collect(&harness.job(10)).await;
    let err = result.unwrap_err();

    assert!(matches!(err, RenderError::ReadinessTimeout { frame: 4, .. }));
    assert!(err.to_string().contains("hero-video"));
    match events.last() {
        Some(ProgressEvent::Error { message }) => assert!(message.contains("hero-video")),
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_delay_retries_fail_job() {
    let harness = TestHarness::new();
    harness
        .launcher
        .add_delay_with_timeout(
            2,
            "slow-fetch",
            MockDelay::Never,
            Duration::from_millis(300),
            2,
        )
        .await;

    let err = harness.orchestrator.render(&harness.job(5)).await.unwrap_err();
    assert!(matches!(err, RenderError::ReadinessTimeout { frame: 2, .. }));
    assert!(err.to_string().contains("slow-fetch"));
}

#[tokio::test(start_paused = true)]
async fn test_delay_resolving_within_retries_succeeds() {
    let harness = TestHarness::new();
    harness
        .launcher
        .add_delay_with_timeout(
            2,
            "slow-fetch",
            MockDelay::ResolveAfter(Duration::from_millis(700)),
            Duration::from_millis(300),
            2,
        )
        .await;

    let outcome = harness.orchestrator.render(&harness.job(5)).await.unwrap();
    assert_eq!(outcome.frames, 5);
}

#[tokio::test(start_paused = true)]
async fn test_scene_load_timeout() {
    let harness = TestHarness::with_timeouts(DriverTimeouts {
        load: Duration::from_secs(1),
        readiness: Duration::from_secs(5),
        paint: Duration::from_secs(5),
    });
    harness.launcher.hang_on_load().await;

    let err = harness.orchestrator.render(&harness.job(5)).await.unwrap_err();
    assert!(matches!(
        err,
        RenderError::SceneLoadTimeout {
            worker_index: 0,
            timeout_ms: 1000
        }
    ));
    assert!(harness.encoder.passes().await.is_empty());
}

#[tokio::test]
async fn test_encoder_failure() {
    let harness = TestHarness::new();
    harness.encoder.fail_on_frame(7).await;

    let err = harness.orchestrator.render(&harness.job(10)).await.unwrap_err();
    assert!(matches!(err, RenderError::EncodingFailure(_)));
    assert!(!harness.job(10).output_path.exists());
}

#[tokio::test]
async fn test_audio_is_mixed_for_single_worker() {
    let harness = TestHarness::new();
    harness
        .launcher
        .set_audio_tracks(vec![fixtures::music_track(0), fixtures::music_track(30)])
        .await;

    let outcome = harness.orchestrator.render(&harness.job(60)).await.unwrap();
    assert_eq!(outcome.audio_tracks_mixed, 2);

    let muxes = harness.encoder.muxes().await;
    assert_eq!(muxes.len(), 1);
    assert_eq!(muxes[0].plan.inputs.len(), 2);
    assert!((muxes[0].duration_secs - 2.0).abs() < 1e-9);

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(content.ends_with("audio: 2 tracks\n"));
}

#[tokio::test]
async fn test_muted_job_skips_audio() {
    let harness = TestHarness::new();
    harness
        .launcher
        .set_audio_tracks(vec![fixtures::music_track(0)])
        .await;

    let outcome = harness
        .orchestrator
        .render(&harness.job(10).with_muted(true))
        .await
        .unwrap();
    assert_eq!(outcome.audio_tracks_mixed, 0);
    assert!(harness.encoder.muxes().await.is_empty());
}

#[tokio::test]
async fn test_audio_mix_failure_is_a_warning() {
    let harness = TestHarness::new();
    harness
        .launcher
        .set_audio_tracks(vec![fixtures::music_track(0)])
        .await;
    harness.encoder.fail_mux("Invalid data found when processing input").await;

    let (result, events) = harness.render_collect(&harness.job(10)).await;
    let outcome = result.expect("audio failure must not fail the render");

    assert_eq!(outcome.audio_tracks_mixed, 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("audio mix failed"));

    let content = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(frame_lines(&content).len(), 10);
    assert!(!content.contains("audio:"));

    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Status { message } if message.contains("audio mix failed")
    )));
    assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));
}

#[tokio::test]
async fn test_event_order() {
    let harness = TestHarness::new();
    let (result, events) = harness.render_collect(&harness.job(3)).await;
    result.unwrap();

    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["start", "progress", "progress", "progress", "complete"]);

    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1);
}
