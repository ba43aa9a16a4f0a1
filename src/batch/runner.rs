use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::detect::{candidate_files, episode_files, file_stems, is_tv_show};
use super::settings::{BatchContext, BatchProcessingInfo, BatchProcessingSettings};
use crate::error::{Result, StreamError};
use crate::naming::extension;
use crate::prompt::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Detecting,
    AwaitingStartSelection,
    ConfiguringFromFirstEpisode,
    AwaitingBatchConfirmation,
    ProcessingRemaining,
    Done,
}

/// Work done for one episode, with the batch's settings cache
#[async_trait]
pub trait EpisodeHandler: Send + Sync {
    async fn handle(&self, episode: &Path, context: &mut BatchContext) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub skipped: Vec<PathBuf>,
}

/// Runs the same preparation over the episodes of a TV show directory.
///
/// The first episode is processed interactively and its answers are stored
/// in a [`BatchContext`]; after confirmation the rest replay them. The
/// context exists only inside [`BatchCoordinator::run`].
pub struct BatchCoordinator<'a> {
    prompt: &'a dyn Prompt,
    state: BatchState,
    context: Option<BatchContext>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(prompt: &'a dyn Prompt) -> Self {
        Self {
            prompt,
            state: BatchState::Idle,
            context: None,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn has_cached_settings(&self) -> bool {
        self.context.is_some()
    }

    fn transition(&mut self, state: BatchState) {
        debug!("Batch state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Episodes of `directory` when it looks like a TV show, `None` otherwise
    pub fn detect(&mut self, directory: &Path) -> Option<Vec<PathBuf>> {
        self.transition(BatchState::Detecting);
        let episodes = candidate_files(&episode_files(directory));
        if !is_tv_show(&file_stems(&episodes)) {
            self.transition(BatchState::Done);
            return None;
        }
        info!("Detected TV show directory with {} video files", episodes.len());
        Some(episodes)
    }

    /// Detect, ask and run. `Ok(None)` when the directory is not a show or
    /// the user wants to handle a single file instead.
    pub async fn run(
        &mut self,
        directory: &Path,
        settings: BatchProcessingSettings,
        handler: &dyn EpisodeHandler,
    ) -> Result<Option<BatchReport>> {
        let Some(episodes) = self.detect(directory) else {
            return Ok(None);
        };
        if !self
            .prompt
            .confirm("This looks like a TV show directory. Process episodes in batch mode?", true)?
        {
            self.transition(BatchState::Done);
            return Ok(None);
        }

        let result = self.run_episodes(directory, episodes, settings, handler).await;
        self.context = None;
        self.transition(BatchState::Done);
        result.map(Some)
    }

    async fn run_episodes(
        &mut self,
        directory: &Path,
        episodes: Vec<PathBuf>,
        settings: BatchProcessingSettings,
        handler: &dyn EpisodeHandler,
    ) -> Result<BatchReport> {
        self.transition(BatchState::AwaitingStartSelection);
        let info = self.select_episodes(directory, episodes)?;
        let mut queue = info.episodes_to_process.clone().into_iter();
        let Some(first) = queue.next() else {
            return Err(StreamError::exit(format!("No episodes found in {}", directory.display())));
        };
        let remaining: Vec<PathBuf> = queue.collect();
        self.context = Some(BatchContext::new(info, settings));

        self.transition(BatchState::ConfiguringFromFirstEpisode);
        info!("Configuring batch from first episode: {}", first.display());
        self.process(&first, handler).await?;
        let mut report = BatchReport {
            processed: vec![first],
            ..BatchReport::default()
        };
        if remaining.is_empty() {
            return Ok(report);
        }

        self.transition(BatchState::AwaitingBatchConfirmation);
        let message = format!(
            "Apply the same settings to the remaining {} episodes?",
            remaining.len()
        );
        if !self.prompt.confirm(&message, true)? {
            info!("Batch processing stopped after the first episode");
            report.skipped = remaining;
            return Ok(report);
        }

        self.transition(BatchState::ProcessingRemaining);
        let total = remaining.len();
        for (i, episode) in remaining.into_iter().enumerate() {
            info!("Processing episode {}/{}: {}", i + 1, total, episode.display());
            match self.process(&episode, handler).await {
                Ok(()) => report.processed.push(episode),
                Err(e) => {
                    warn!("Failed to process {}: {}", episode.display(), e);
                    report.failed.push((episode, e.to_string()));
                }
            }
        }
        info!(
            "Batch finished: {} processed, {} failed",
            report.processed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn process(&mut self, episode: &Path, handler: &dyn EpisodeHandler) -> Result<()> {
        let Some(context) = self.context.as_mut() else {
            return Err(StreamError::Config("Batch settings are not initialized".to_string()));
        };
        handler.handle(episode, context).await
    }

    /// Format group (when several containers are mixed) and starting episode
    fn select_episodes(&self, directory: &Path, episodes: Vec<PathBuf>) -> Result<BatchProcessingInfo> {
        let formats: Vec<String> = episodes
            .iter()
            .map(|p| extension(p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let episodes: Vec<PathBuf> = if formats.len() > 1 {
            let labels: Vec<String> = formats
                .iter()
                .map(|f| {
                    let count = episodes.iter().filter(|p| extension(p) == *f).count();
                    format!("{} ({} files)", f, count)
                })
                .collect();
            let choice = self.prompt.select_one("Select file format to process", &labels)?;
            let format = formats
                .get(choice)
                .ok_or_else(|| StreamError::Prompt(format!("Selected option out of range: {}", choice)))?;
            episodes.into_iter().filter(|p| extension(p) == *format).collect()
        } else {
            episodes
        };

        let mut start = 0;
        if episodes.len() > 1 && self.prompt.confirm("Start from a specific episode?", false)? {
            let labels: Vec<String> = episodes
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                })
                .collect();
            start = self.prompt.select_one("Select starting episode", &labels)?;
        }

        let episodes_to_process: Vec<PathBuf> = episodes.get(start..).map(<[PathBuf]>::to_vec).unwrap_or_default();
        Ok(BatchProcessingInfo {
            directory: directory.to_path_buf(),
            starting_episode: (start > 0).then(|| episodes_to_process.first().cloned()).flatten(),
            episodes_to_process,
        })
    }
}
