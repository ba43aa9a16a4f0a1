use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::{BatchContext, Decision, Decisions};
use crate::cache::{ArtifactRequest, find_matching_artifact};
use crate::config::MediaSettings;
use crate::error::{Result, StreamError};
use crate::fs::{audio_files, enforce_utf8, is_video_file, related_files, subtitle_files, video_files};
use crate::matcher::{Candidates, ExternalCandidate, Picked, requires_transcoding, same_language, select_audio, select_subtitle};
use crate::media::{AudioSelection, MediaInfo, MediaStream, Mp4Job, Prober, Transcoder};
use crate::naming::{cache_path, extension, extracted_subtitle_path, language_from_path};
use crate::prompt::{Prompt, prompt_language};

/// What the user asked to stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareRequest {
    /// Video file, or a directory to pick one from
    pub media: PathBuf,
    pub audio_file: Option<PathBuf>,
    pub audio_lang: Option<String>,
    pub subtitle_file: Option<PathBuf>,
    pub subtitle_lang: Option<String>,
    pub burn_subtitles: bool,
    pub add_subtitles_to_mp4: bool,
}

impl PrepareRequest {
    /// Same request for another file (batch episodes)
    pub fn for_media(&self, media: &Path) -> Self {
        Self {
            media: media.to_path_buf(),
            ..self.clone()
        }
    }
}

/// Browser-ready result of a preparation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamMedia {
    /// Video the preparation started from
    pub source: PathBuf,
    pub path: PathBuf,
    pub subtitles_burned: bool,
    /// Subtitle to serve next to the video (VTT when converted)
    pub subtitle_path: Option<PathBuf>,
    pub subtitle_lang: Option<String>,
}

/// probe → audio → subtitles → reuse or convert → VTT sidecar
pub struct PreparationPipeline {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    prompt: Arc<dyn Prompt>,
    settings: MediaSettings,
}

impl PreparationPipeline {
    pub fn new(
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        prompt: Arc<dyn Prompt>,
        settings: MediaSettings,
    ) -> Self {
        Self {
            prober,
            transcoder,
            prompt,
            settings,
        }
    }

    pub fn prober(&self) -> &dyn Prober {
        self.prober.as_ref()
    }

    pub fn prompt(&self) -> &dyn Prompt {
        self.prompt.as_ref()
    }

    /// The video itself, or one picked from the videos directly inside a directory
    pub fn select_video(&self, media: &Path) -> Result<PathBuf> {
        if !media.exists() {
            return Err(StreamError::exit(format!("Media file not found: {}", media.display())));
        }
        let media = std::path::absolute(media)?;
        if !media.is_dir() {
            if !is_video_file(&media) {
                return Err(StreamError::exit(format!("Unsupported video file: {}", media.display())));
            }
            return Ok(media);
        }

        let videos = video_files(&media, 0);
        if videos.is_empty() {
            return Err(StreamError::exit(format!("No video files found in {}", media.display())));
        }
        let labels: Vec<String> = videos
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            })
            .collect();
        let choice = self.prompt.select_one("Select video file", &labels)?;
        videos
            .get(choice)
            .cloned()
            .ok_or_else(|| StreamError::Prompt(format!("Selected option out of range: {}", choice)))
    }

    /// Prepare one file. `context` carries the batch's answers when running over episodes.
    pub async fn prepare(&self, request: &PrepareRequest, context: Option<&mut BatchContext>) -> Result<StreamMedia> {
        let media_file = self.select_video(&request.media)?;
        let info = self.prober.probe(&media_file).await?;
        let video = info.video()?;
        info!("Media: {} | video {}", info.title, video);
        for stream in info.audios() {
            info!("Audio #{}: {}", stream.index, stream);
        }
        for stream in info.subtitles() {
            info!("Subtitle #{}: {}", stream.index, stream);
        }

        let mut decisions = Decisions::new(self.prompt.as_ref(), context);
        let (burn_subtitles, add_subtitles_to_mp4) =
            decisions.subtitle_mode((request.burn_subtitles, request.add_subtitles_to_mp4));
        let request = &PrepareRequest {
            burn_subtitles,
            add_subtitles_to_mp4,
            ..request.clone()
        };
        let (audio, audio_lang) = self.select_audio(&media_file, &info, request, &mut decisions).await?;
        let subtitle = match self.select_subtitle(&media_file, &info, request, &mut decisions).await? {
            Some((path, lang)) => Some((self.normalize_subtitle(&path, &lang).await?, lang)),
            None => None,
        };

        if request.burn_subtitles && subtitle.is_none() {
            return Err(StreamError::exit("Subtitles not found for burning"));
        }
        if request.add_subtitles_to_mp4 && subtitle.is_none() {
            return Err(StreamError::exit("Subtitles not found for adding to MP4"));
        }

        let (subtitle_file, subtitle_lang) = match &subtitle {
            Some((path, lang)) => (Some(path.clone()), Some(lang.clone())),
            None => (None, None),
        };
        let embed = request.add_subtitles_to_mp4 && !request.burn_subtitles;
        let artifact = ArtifactRequest {
            audio_lang: audio_lang.clone(),
            audio_stream: match &audio {
                AudioSelection::InternalStream(stream) => Some(stream.clone()),
                AudioSelection::ExternalFile(_) => None,
            },
            audio_file: match &audio {
                AudioSelection::ExternalFile(path) => Some(path.clone()),
                AudioSelection::InternalStream(_) => None,
            },
            subtitle_file: subtitle_file.clone().filter(|_| embed),
            subtitle_lang: subtitle_lang.clone(),
            burn_subtitles: request.burn_subtitles,
        };

        let output_file = cache_path(&media_file, "mp4", &audio_lang);
        let path = match find_matching_artifact(self.prober.as_ref(), &media_file, &artifact).await? {
            Some(found) => {
                info!("Found already converted file: {}", found.display());
                found
            }
            None if output_file.exists() && !self.overwrite_output(&output_file, &mut decisions)? => output_file,
            None => {
                let job = Mp4Job {
                    media_file: media_file.clone(),
                    output_file,
                    audio,
                    audio_lang,
                    subtitle_file: subtitle_file.clone().filter(|_| request.burn_subtitles || embed),
                    subtitle_lang: subtitle_lang.clone(),
                    burn_subtitles: request.burn_subtitles,
                };
                self.transcoder.convert_to_mp4(&job).await?
            }
        };

        let subtitle_path = match subtitle_file {
            Some(path) if !request.burn_subtitles && extension(&path) != "vtt" => {
                Some(self.vtt_sidecar(&path, subtitle_lang.as_deref().unwrap_or_default(), &mut decisions).await?)
            }
            other => other,
        };

        Ok(StreamMedia {
            source: media_file,
            path,
            subtitles_burned: request.burn_subtitles,
            subtitle_path,
            subtitle_lang,
        })
    }

    async fn select_audio(
        &self,
        media_file: &Path,
        info: &MediaInfo,
        request: &PrepareRequest,
        decisions: &mut Decisions<'_>,
    ) -> Result<(AudioSelection, String)> {
        if let Some(audio_file) = &request.audio_file {
            return self.explicit_audio(audio_file, request.audio_lang.as_deref(), decisions).await;
        }

        let external = self.external_candidates(media_file, true).await;
        let candidates = Candidates::new(info.audios().into_iter().cloned().collect(), external);
        let desired = request.audio_lang.clone().or_else(|| decisions.audio_lang());
        let selected = select_audio(desired.as_deref(), candidates, decisions.audio_replay(), decisions.prompt())?;
        decisions.remember_audio(selected.identity.clone(), &selected.language);
        info!("Selected audio: {} [{}]", selected.picked.stream(), selected.language);

        match selected.picked {
            Picked::Internal(stream) => self.internal_audio(media_file, stream, selected.language, decisions).await,
            Picked::External { path, stream } => self.external_audio(&path, &stream, selected.language, decisions).await,
        }
    }

    async fn explicit_audio(
        &self,
        audio_file: &Path,
        desired: Option<&str>,
        decisions: &mut Decisions<'_>,
    ) -> Result<(AudioSelection, String)> {
        let info = self.prober.probe(audio_file).await?;
        let stream = info
            .first_audio()
            .cloned()
            .ok_or_else(|| StreamError::exit(format!("Audio stream not found: {}", audio_file.display())))?;

        let language = match (desired, stream.language.as_deref()) {
            (Some(wanted), Some(found)) => {
                if !same_language(wanted, found) {
                    warn!("Audio file language {} differs from requested {}, using {}", found, wanted, found);
                }
                found.to_lowercase()
            }
            (Some(wanted), None) => wanted.to_lowercase(),
            (None, Some(found)) => found.to_lowercase(),
            (None, None) => prompt_language(decisions.prompt(), &format!("audio file: {}", audio_file.display()))?,
        };
        self.external_audio(audio_file, &stream, language, decisions).await
    }

    async fn internal_audio(
        &self,
        media_file: &Path,
        stream: MediaStream,
        language: String,
        decisions: &mut Decisions<'_>,
    ) -> Result<(AudioSelection, String)> {
        let codec = &self.settings.browser_audio_codec;
        if !requires_transcoding(&stream, codec) {
            return Ok((AudioSelection::InternalStream(stream), language));
        }

        let converted = cache_path(media_file, codec, &language);
        if self.use_existing_audio(&converted, decisions)? {
            return Ok((AudioSelection::ExternalFile(converted), language));
        }
        warn!("Audio codec {} is not supported by browsers", stream.codec);
        let message = format!("Convert audio to {}?", codec.to_uppercase());
        if decisions.confirm(Decision::ConvertAudio, &message, true)? {
            let output = self
                .transcoder
                .extract_audio_with_convert(media_file, &stream, &language, &converted)
                .await?;
            return Ok((AudioSelection::ExternalFile(output), language));
        }
        Ok((AudioSelection::InternalStream(stream), language))
    }

    async fn external_audio(
        &self,
        audio_file: &Path,
        stream: &MediaStream,
        language: String,
        decisions: &mut Decisions<'_>,
    ) -> Result<(AudioSelection, String)> {
        let codec = &self.settings.browser_audio_codec;
        if !requires_transcoding(stream, codec) {
            return Ok((AudioSelection::ExternalFile(audio_file.to_path_buf()), language));
        }

        let converted = cache_path(audio_file, codec, &language);
        if self.use_existing_audio(&converted, decisions)? {
            return Ok((AudioSelection::ExternalFile(converted), language));
        }
        warn!("Audio codec {} is not supported by browsers", stream.codec);
        let message = format!("Convert audio to {}?", codec.to_uppercase());
        if decisions.confirm(Decision::ConvertAudio, &message, true)? {
            let output = self.transcoder.convert_audio(audio_file, &converted, &language).await?;
            return Ok((AudioSelection::ExternalFile(output), language));
        }
        Ok((AudioSelection::ExternalFile(audio_file.to_path_buf()), language))
    }

    fn overwrite_output(&self, output_file: &Path, decisions: &mut Decisions<'_>) -> Result<bool> {
        let message = format!("File already exists: {}. Overwrite?", output_file.display());
        decisions.confirm(Decision::OverwriteOutput, &message, false)
    }

    fn use_existing_audio(&self, converted: &Path, decisions: &mut Decisions<'_>) -> Result<bool> {
        if !converted.exists() {
            return Ok(false);
        }
        let message = format!("Converted audio already exists: {}. Use it?", converted.display());
        decisions.confirm(Decision::UseExistingAudio, &message, true)
    }

    /// Audio or subtitle files near the video, each with its first stream of that kind
    async fn external_candidates(&self, media_file: &Path, audio: bool) -> Vec<ExternalCandidate> {
        let Some(directory) = media_file.parent() else {
            return Vec::new();
        };
        let depth = self.settings.search_depth;
        let files = if audio {
            related_files(media_file, audio_files(directory, depth), self.settings.max_external_audio, "audio")
        } else {
            related_files(
                media_file,
                subtitle_files(directory, depth),
                self.settings.max_external_subtitles,
                "subtitle",
            )
        };

        let mut candidates = Vec::with_capacity(files.len());
        for path in files {
            let info = match self.prober.probe(&path).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let stream = if audio { info.first_audio() } else { info.first_subtitle() };
            if let Some(stream) = stream {
                candidates.push(ExternalCandidate {
                    stream: stream.clone(),
                    path,
                });
            }
        }
        candidates
    }

    async fn select_subtitle(
        &self,
        media_file: &Path,
        info: &MediaInfo,
        request: &PrepareRequest,
        decisions: &mut Decisions<'_>,
    ) -> Result<Option<(PathBuf, String)>> {
        if let Some(subtitle_file) = &request.subtitle_file {
            return Ok(Some((
                subtitle_file.clone(),
                self.explicit_subtitle_lang(subtitle_file, request.subtitle_lang.as_deref(), decisions)
                    .await?,
            )));
        }

        let external = self.external_candidates(media_file, false).await;
        let candidates = Candidates::new(info.subtitles().into_iter().cloned().collect(), external);
        if candidates.is_empty() {
            return Ok(None);
        }
        let requested = request.burn_subtitles || request.add_subtitles_to_mp4 || request.subtitle_lang.is_some();
        if !requested && !decisions.confirm(Decision::SelectSubtitles, "Select subtitles?", true)? {
            return Ok(None);
        }

        let desired = request.subtitle_lang.clone().or_else(|| decisions.subtitle_lang());
        let Some(selected) = select_subtitle(desired.as_deref(), candidates, decisions.subtitle_replay(), decisions.prompt())?
        else {
            return Ok(None);
        };
        decisions.remember_subtitle(selected.identity.clone(), &selected.language);
        info!("Selected subtitle: {} [{}]", selected.picked.stream(), selected.language);

        let language = selected.language;
        match selected.picked {
            Picked::External { path, .. } => Ok(Some((path, language))),
            Picked::Internal(stream) => {
                let output = extracted_subtitle_path(media_file, &stream.codec, &language);
                if output.exists() {
                    let message = format!("Subtitle file already exists: {}. Overwrite?", output.display());
                    if !decisions.confirm(Decision::OverwriteExtracted, &message, false)? {
                        return Ok(Some((output, language)));
                    }
                }
                let path = self
                    .transcoder
                    .extract_subtitle(media_file, &stream, &language, &output)
                    .await?;
                Ok(Some((path, language)))
            }
        }
    }

    async fn explicit_subtitle_lang(
        &self,
        subtitle_file: &Path,
        desired: Option<&str>,
        decisions: &mut Decisions<'_>,
    ) -> Result<String> {
        if let Some(language) = desired {
            return Ok(language.to_lowercase());
        }
        let tagged = match self.prober.probe(subtitle_file).await {
            Ok(info) => info.first_subtitle().and_then(|s| s.language.clone()),
            Err(e) => {
                warn!("Cannot read subtitle {}: {}", subtitle_file.display(), e);
                None
            }
        };
        match tagged.or_else(|| language_from_path(subtitle_file)) {
            Some(language) => Ok(language.to_lowercase()),
            None => prompt_language(decisions.prompt(), &format!("subtitle file: {}", subtitle_file.display())),
        }
    }

    /// UTF-8 text and a language tag in the file
    async fn normalize_subtitle(&self, path: &Path, language: &str) -> Result<PathBuf> {
        let path = enforce_utf8(path)?;
        match self.prober.probe(&path).await {
            Ok(info) if info.first_subtitle().is_some_and(|s| s.language.is_none()) => {
                self.transcoder.set_subtitle_language(&path, language).await?;
            }
            Ok(_) => {}
            Err(e) => warn!("Cannot read subtitle {}: {}", path.display(), e),
        }
        Ok(path)
    }

    async fn vtt_sidecar(&self, subtitle: &Path, language: &str, decisions: &mut Decisions<'_>) -> Result<PathBuf> {
        let vtt = subtitle.with_extension("vtt");
        if vtt.exists() {
            let message = format!("VTT subtitle already exists: {}. Use it?", vtt.display());
            if decisions.confirm(Decision::UseExistingVtt, &message, true)? {
                return Ok(vtt);
            }
        }
        if decisions.confirm(Decision::ConvertSubtitle, "Convert subtitle to VTT for browser playback?", true)? {
            return self.transcoder.convert_subtitle_to_vtt(subtitle, language).await;
        }
        Ok(subtitle.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::MockPrompt;

    fn pipeline(prompt: MockPrompt) -> PreparationPipeline {
        PreparationPipeline::new(
            crate::media::MediaToolsFactory::create_prober(MediaSettings::default()),
            Arc::new(crate::media::FfmpegTranscoder::new(MediaSettings::default())),
            Arc::new(prompt),
            MediaSettings::default(),
        )
    }

    #[test]
    fn test_select_video_from_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.mkv"), b"").unwrap();
        std::fs::write(temp.path().join("a.mp4"), b"").unwrap();

        let mut prompt = MockPrompt::new();
        prompt
            .expect_select_one()
            .withf(|_, options| options == ["a.mp4".to_string(), "b.mkv".to_string()])
            .returning(|_, _| Ok(1));

        let chosen = pipeline(prompt).select_video(temp.path()).unwrap();
        assert_eq!(chosen, temp.path().join("b.mkv"));
    }

    #[test]
    fn test_select_video_errors() {
        let temp = assert_fs::TempDir::new().unwrap();
        let pipeline = pipeline(MockPrompt::new());

        let missing = pipeline.select_video(&temp.path().join("absent.mkv")).unwrap_err();
        assert_eq!(missing.user_facing_code(), Some(1));

        let empty = pipeline.select_video(temp.path()).unwrap_err();
        assert!(empty.to_string().starts_with("No video files found"));

        let notes = temp.path().join("notes.srt");
        std::fs::write(&notes, b"").unwrap();
        let unsupported = pipeline.select_video(&notes).unwrap_err();
        assert!(unsupported.to_string().starts_with("Unsupported video file:"));
        assert_eq!(unsupported.user_facing_code(), Some(1));
    }

    #[test]
    fn test_request_for_episode_keeps_options() {
        let request = PrepareRequest {
            media: PathBuf::from("/shows"),
            audio_lang: Some("eng".to_string()),
            burn_subtitles: true,
            ..PrepareRequest::default()
        };
        let episode = request.for_media(Path::new("/shows/e1.mkv"));
        assert_eq!(episode.media, PathBuf::from("/shows/e1.mkv"));
        assert_eq!(episode.audio_lang.as_deref(), Some("eng"));
        assert!(episode.burn_subtitles);
    }
}
