mod common;

use assert_fs::TempDir;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use browser_stream::batch::{BatchContext, BatchCoordinator, BatchProcessingSettings, BatchState, EpisodeHandler};
use browser_stream::error::Result;
use browser_stream::media::{AudioSelection, StreamKind};
use browser_stream::pipeline::{PrepareRequest, PreparationPipeline};
use common::{FakeProber, RecordingTranscoder, ScriptedPrompt, pipeline, stream, touch, video};

struct PrepareEpisode<'a> {
    pipeline: &'a PreparationPipeline,
    request: PrepareRequest,
}

#[async_trait]
impl EpisodeHandler for PrepareEpisode<'_> {
    async fn handle(&self, episode: &Path, context: &mut BatchContext) -> Result<()> {
        self.pipeline
            .prepare(&self.request.for_media(episode), Some(context))
            .await?;
        Ok(())
    }
}

fn show_fixture(temp: &TempDir, prober: &FakeProber) {
    for name in ["Show_E01.mkv", "Show_E02.mkv", "Show_E03.mkv"] {
        let episode = touch(&temp.path().join(name));
        prober.add(
            &episode,
            vec![
                video(),
                stream(1, StreamKind::Audio, "aac", Some("eng")),
                stream(2, StreamKind::Audio, "aac", Some("spa")),
                stream(3, StreamKind::Subtitle, "subrip", Some("eng")),
            ],
        );
    }
}

#[tokio::test]
async fn test_first_episode_answers_are_replayed() {
    let temp = TempDir::new().unwrap();
    let prober = Arc::new(FakeProber::default());
    show_fixture(&temp, &prober);
    let transcoder = Arc::new(RecordingTranscoder::default());
    let prompt = Arc::new(
        ScriptedPrompt::default()
            .confirm_with("Process episodes in batch mode?", true)
            .confirm_with("Start from a specific episode?", false)
            .confirm_with("Apply the same settings to the remaining 2 episodes?", true)
            .confirm_with("Select subtitles?", false)
            .select_with("Select audio stream", 1),
    );

    let pipeline = pipeline(prober, transcoder.clone(), prompt.clone());
    let handler = PrepareEpisode {
        pipeline: &pipeline,
        request: PrepareRequest::default(),
    };
    let mut coordinator = BatchCoordinator::new(prompt.as_ref());
    let report = coordinator
        .run(temp.path(), BatchProcessingSettings::new(false, false), &handler)
        .await
        .unwrap()
        .expect("batch mode runs");

    assert_eq!(report.processed.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(prompt.times_asked("Select audio stream"), 1);
    assert_eq!(prompt.times_asked("Select subtitles?"), 1);

    let jobs = transcoder.mp4_jobs();
    assert_eq!(jobs.len(), 3);
    for job in &jobs {
        assert_eq!(job.audio_lang, "spa");
        assert!(matches!(&job.audio, AudioSelection::InternalStream(s) if s.index == 2));
        assert!(job.output_file.to_string_lossy().ends_with(".sp.stream.mp4"));
    }

    assert_eq!(coordinator.state(), BatchState::Done);
    assert!(!coordinator.has_cached_settings());
}

#[tokio::test]
async fn test_declined_batch_leaves_no_answers_behind() {
    let temp = TempDir::new().unwrap();
    let prober = Arc::new(FakeProber::default());
    show_fixture(&temp, &prober);
    let transcoder = Arc::new(RecordingTranscoder::default());
    let prompt = Arc::new(
        ScriptedPrompt::default()
            .confirm_with("Process episodes in batch mode?", true)
            .confirm_with("Start from a specific episode?", false)
            .confirm_with("Apply the same settings", false)
            .confirm_with("Select subtitles?", false)
            .select_with("Select audio stream", 1),
    );

    let pipeline = pipeline(prober, transcoder.clone(), prompt.clone());
    let handler = PrepareEpisode {
        pipeline: &pipeline,
        request: PrepareRequest::default(),
    };
    let mut coordinator = BatchCoordinator::new(prompt.as_ref());
    let report = coordinator
        .run(temp.path(), BatchProcessingSettings::new(false, false), &handler)
        .await
        .unwrap()
        .expect("batch mode runs");
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.skipped.len(), 2);
    assert!(!coordinator.has_cached_settings());

    // a single-file run afterwards asks again
    pipeline
        .prepare(&PrepareRequest::default().for_media(&temp.path().join("Show_E02.mkv")), None)
        .await
        .unwrap();
    assert_eq!(prompt.times_asked("Select audio stream"), 2);
    assert_eq!(transcoder.mp4_jobs().len(), 2);
}
