use std::path::PathBuf;
use tracing::debug;

use crate::error::Result;
use crate::matcher::SelectedStream;
use crate::prompt::Prompt;

/// Yes/no questions the pipeline asks once per batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    SelectSubtitles,
    ConvertAudio,
    UseExistingAudio,
    ConvertSubtitle,
    UseExistingVtt,
    OverwriteOutput,
    OverwriteExtracted,
}

/// Answers collected while configuring from the first episode.
///
/// `None` means "not decided yet": the next episode that needs the answer
/// asks the user and stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchProcessingSettings {
    pub audio_stream: Option<SelectedStream>,
    pub audio_lang: Option<String>,
    pub subtitle_stream: Option<SelectedStream>,
    pub subtitle_lang: Option<String>,
    pub burn_subtitles: bool,
    pub add_subtitles_to_mp4: bool,
    pub select_subtitles: Option<bool>,
    pub convert_audio: Option<bool>,
    pub use_existing_audio: Option<bool>,
    pub convert_subtitle: Option<bool>,
    pub use_existing_vtt: Option<bool>,
    pub overwrite_output: Option<bool>,
    pub overwrite_extracted: Option<bool>,
}

impl BatchProcessingSettings {
    pub fn new(burn_subtitles: bool, add_subtitles_to_mp4: bool) -> Self {
        Self {
            burn_subtitles,
            add_subtitles_to_mp4,
            ..Self::default()
        }
    }

    fn slot(&mut self, decision: Decision) -> &mut Option<bool> {
        match decision {
            Decision::SelectSubtitles => &mut self.select_subtitles,
            Decision::ConvertAudio => &mut self.convert_audio,
            Decision::UseExistingAudio => &mut self.use_existing_audio,
            Decision::ConvertSubtitle => &mut self.convert_subtitle,
            Decision::UseExistingVtt => &mut self.use_existing_vtt,
            Decision::OverwriteOutput => &mut self.overwrite_output,
            Decision::OverwriteExtracted => &mut self.overwrite_extracted,
        }
    }
}

/// Which episodes a batch run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProcessingInfo {
    pub directory: PathBuf,
    pub episodes_to_process: Vec<PathBuf>,
    pub starting_episode: Option<PathBuf>,
}

/// Settings cache for one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    pub info: BatchProcessingInfo,
    pub settings: BatchProcessingSettings,
}

impl BatchContext {
    pub fn new(info: BatchProcessingInfo, settings: BatchProcessingSettings) -> Self {
        Self { info, settings }
    }
}

/// Asks the user, or replays the batch's stored answer
pub struct Decisions<'a> {
    prompt: &'a dyn Prompt,
    settings: Option<&'a mut BatchProcessingSettings>,
}

impl<'a> Decisions<'a> {
    pub fn new(prompt: &'a dyn Prompt, context: Option<&'a mut BatchContext>) -> Self {
        Self {
            prompt,
            settings: context.map(|c| &mut c.settings),
        }
    }

    pub fn prompt(&self) -> &'a dyn Prompt {
        self.prompt
    }

    /// Burn and embed flags: the batch's own when running over episodes, `requested` otherwise
    pub fn subtitle_mode(&self, requested: (bool, bool)) -> (bool, bool) {
        match self.settings.as_deref() {
            Some(settings) => (settings.burn_subtitles, settings.add_subtitles_to_mp4),
            None => requested,
        }
    }

    pub fn confirm(&mut self, decision: Decision, message: &str, default: bool) -> Result<bool> {
        let Some(settings) = self.settings.as_deref_mut() else {
            return self.prompt.confirm(message, default);
        };
        let slot = settings.slot(decision);
        if let Some(answer) = *slot {
            debug!("Reusing batch answer for {:?}: {}", decision, answer);
            return Ok(answer);
        }
        let answer = self.prompt.confirm(message, default)?;
        *slot = Some(answer);
        Ok(answer)
    }

    pub fn audio_replay(&self) -> Option<&SelectedStream> {
        self.settings.as_deref()?.audio_stream.as_ref()
    }

    pub fn subtitle_replay(&self) -> Option<&SelectedStream> {
        self.settings.as_deref()?.subtitle_stream.as_ref()
    }

    pub fn audio_lang(&self) -> Option<String> {
        self.settings.as_deref()?.audio_lang.clone()
    }

    pub fn subtitle_lang(&self) -> Option<String> {
        self.settings.as_deref()?.subtitle_lang.clone()
    }

    pub fn remember_audio(&mut self, identity: SelectedStream, language: &str) {
        if let Some(settings) = self.settings.as_deref_mut() {
            settings.audio_stream = Some(identity);
            settings.audio_lang = Some(language.to_string());
        }
    }

    pub fn remember_subtitle(&mut self, identity: SelectedStream, language: &str) {
        if let Some(settings) = self.settings.as_deref_mut() {
            settings.subtitle_stream = Some(identity);
            settings.subtitle_lang = Some(language.to_string());
        }
    }
}
