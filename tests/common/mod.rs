#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use browser_stream::config::MediaSettings;
use browser_stream::error::{Result, StreamError};
use browser_stream::media::{MediaInfo, MediaStream, Mp4Job, Prober, RepackJob, StreamKind, Transcoder};
use browser_stream::pipeline::PreparationPipeline;
use browser_stream::prompt::Prompt;

pub fn stream(index: usize, kind: StreamKind, codec: &str, language: Option<&str>) -> MediaStream {
    MediaStream {
        index,
        kind,
        codec: codec.to_string(),
        language: language.map(str::to_string),
        title: format!("{} #{}", kind, index),
        encoding_info: None,
    }
}

pub fn video() -> MediaStream {
    stream(0, StreamKind::Video, "h264", None)
}

pub fn media_info(path: &Path, streams: Vec<MediaStream>) -> MediaInfo {
    MediaInfo {
        filename: path.to_path_buf(),
        title: path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        bitrate: "1000 kb/s".to_string(),
        duration: None,
        streams,
        comment: None,
    }
}

/// Create an empty file so path checks pass
pub fn touch(path: &Path) -> PathBuf {
    std::fs::write(path, b"").expect("create fixture file");
    path.to_path_buf()
}

/// Prober answering from a fixed table
#[derive(Default)]
pub struct FakeProber {
    infos: Mutex<HashMap<PathBuf, MediaInfo>>,
}

impl FakeProber {
    pub fn with(self, path: &Path, streams: Vec<MediaStream>) -> Self {
        self.add(path, streams);
        self
    }

    pub fn add(&self, path: &Path, streams: Vec<MediaStream>) {
        self.infos
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), media_info(path, streams));
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.infos
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StreamError::FileNotFound(path.display().to_string()))
    }
}

/// Transcoder that records jobs and returns the requested output paths
#[derive(Default)]
pub struct RecordingTranscoder {
    pub mp4_jobs: Mutex<Vec<Mp4Job>>,
    pub audio_extractions: Mutex<Vec<(PathBuf, MediaStream, PathBuf)>>,
    pub vtt_conversions: Mutex<Vec<PathBuf>>,
}

impl RecordingTranscoder {
    pub fn mp4_jobs(&self) -> Vec<Mp4Job> {
        self.mp4_jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    async fn convert_to_mp4(&self, job: &Mp4Job) -> Result<PathBuf> {
        self.mp4_jobs.lock().unwrap().push(job.clone());
        Ok(job.output_file.clone())
    }

    async fn convert_subtitle_to_vtt(&self, subtitle_file: &Path, _subtitle_lang: &str) -> Result<PathBuf> {
        self.vtt_conversions.lock().unwrap().push(subtitle_file.to_path_buf());
        Ok(subtitle_file.with_extension("vtt"))
    }

    async fn convert_audio(&self, _audio_file: &Path, output_file: &Path, _audio_lang: &str) -> Result<PathBuf> {
        Ok(output_file.to_path_buf())
    }

    async fn extract_subtitle(
        &self,
        _media_file: &Path,
        _stream: &MediaStream,
        _subtitle_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf> {
        Ok(output_file.to_path_buf())
    }

    async fn extract_audio_with_convert(
        &self,
        media_file: &Path,
        stream: &MediaStream,
        _audio_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf> {
        self.audio_extractions.lock().unwrap().push((
            media_file.to_path_buf(),
            stream.clone(),
            output_file.to_path_buf(),
        ));
        Ok(output_file.to_path_buf())
    }

    async fn set_subtitle_language(&self, _subtitle_file: &Path, _subtitle_lang: &str) -> Result<()> {
        Ok(())
    }

    async fn repack(&self, job: &RepackJob) -> Result<PathBuf> {
        Ok(job.output_file.clone())
    }
}

/// Prompt answering by message substring. Unscripted questions fail the test.
#[derive(Default)]
pub struct ScriptedPrompt {
    confirms: Vec<(String, bool)>,
    selections: Vec<(String, usize)>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn confirm_with(mut self, fragment: &str, answer: bool) -> Self {
        self.confirms.push((fragment.to_string(), answer));
        self
    }

    pub fn select_with(mut self, fragment: &str, answer: usize) -> Self {
        self.selections.push((fragment.to_string(), answer));
        self
    }

    /// Every message shown so far, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn times_asked(&self, fragment: &str) -> usize {
        self.asked().iter().filter(|m| m.contains(fragment)).count()
    }

    fn record(&self, message: &str) {
        self.asked.lock().unwrap().push(message.to_string());
    }
}

impl Prompt for ScriptedPrompt {
    fn select_one(&self, message: &str, _options: &[String]) -> Result<usize> {
        self.record(message);
        self.selections
            .iter()
            .find(|(fragment, _)| message.contains(fragment.as_str()))
            .map(|(_, answer)| *answer)
            .ok_or_else(|| StreamError::Prompt(format!("unexpected selection: {}", message)))
    }

    fn select_many(&self, message: &str, _options: &[String], defaults: &[usize]) -> Result<Vec<usize>> {
        self.record(message);
        Ok(defaults.to_vec())
    }

    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        self.record(message);
        self.confirms
            .iter()
            .find(|(fragment, _)| message.contains(fragment.as_str()))
            .map(|(_, answer)| *answer)
            .ok_or_else(|| StreamError::Prompt(format!("unexpected question: {}", message)))
    }

    fn prompt_text(&self, message: &str) -> Result<String> {
        self.record(message);
        Err(StreamError::Prompt(format!("unexpected text input: {}", message)))
    }

    fn prompt_secret(&self, message: &str) -> Result<String> {
        self.record(message);
        Err(StreamError::Prompt(format!("unexpected secret input: {}", message)))
    }
}

pub fn pipeline(
    prober: Arc<FakeProber>,
    transcoder: Arc<RecordingTranscoder>,
    prompt: Arc<ScriptedPrompt>,
) -> PreparationPipeline {
    PreparationPipeline::new(prober, transcoder, prompt, MediaSettings::default())
}
