use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{FfmpegCommandBuilder, MediaInfo, MediaStream, Mp4Job, Prober, RepackJob, Transcoder, parse_probe_output};
use crate::config::MediaSettings;
use crate::error::{Result, StreamError};
use crate::process::ensure_installed;

/// FFmpeg-backed prober; results are cached per absolute path for the process lifetime
pub struct FfmpegProber {
    command_builder: FfmpegCommandBuilder,
    cache: Mutex<HashMap<PathBuf, MediaInfo>>,
}

impl FfmpegProber {
    pub fn new(settings: MediaSettings) -> Self {
        Self {
            command_builder: FfmpegCommandBuilder::new(settings),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, path: &Path) -> Option<MediaInfo> {
        self.cache.lock().ok()?.get(path).cloned()
    }

    fn remember(&self, path: PathBuf, info: MediaInfo) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path, info);
        }
    }
}

#[async_trait]
impl Prober for FfmpegProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let path = std::path::absolute(path)?;
        if let Some(info) = self.cached(&path) {
            return Ok(info);
        }
        if !path.exists() {
            return Err(StreamError::FileNotFound(path.display().to_string()));
        }

        let output = self.command_builder.probe(&path).execute().await?;
        if output.output.trim().is_empty() {
            return Err(StreamError::Probe(format!(
                "{} produced no output for {}",
                self.command_builder.settings().binary_path,
                path.display()
            )));
        }

        let parsed = parse_probe_output(&output.output, &path);
        for diagnostic in &parsed.diagnostics {
            warn!("{}", diagnostic);
        }
        debug!("Probed {}: {} streams", path.display(), parsed.info.streams.len());

        self.remember(path, parsed.info.clone());
        Ok(parsed.info)
    }
}

/// FFmpeg-backed transcoder
pub struct FfmpegTranscoder {
    command_builder: FfmpegCommandBuilder,
}

impl FfmpegTranscoder {
    pub fn new(settings: MediaSettings) -> Self {
        Self {
            command_builder: FfmpegCommandBuilder::new(settings),
        }
    }

    /// Check that the ffmpeg binary is reachable
    pub fn check_availability(&self) -> Result<()> {
        ensure_installed(&self.command_builder.settings().binary_path)
    }
}

fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    if input == output {
        return Err(StreamError::exit(format!(
            "ffmpeg: Output file {} cannot be the same as input file",
            output.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert_to_mp4(&self, job: &Mp4Job) -> Result<PathBuf> {
        info!("Converting media file: {} to MP4 format", job.media_file.display());
        ensure_distinct(&job.media_file, &job.output_file)?;

        self.command_builder.convert_to_mp4(job).execute().await?;

        info!("MP4 conversion completed: {}", job.output_file.display());
        Ok(job.output_file.clone())
    }

    async fn convert_subtitle_to_vtt(&self, subtitle_file: &Path, subtitle_lang: &str) -> Result<PathBuf> {
        info!("Converting subtitle file: {} to VTT format", subtitle_file.display());
        let output = subtitle_file.with_extension("vtt");
        ensure_distinct(subtitle_file, &output)?;

        self.command_builder
            .convert_subtitle_to_vtt(subtitle_file, subtitle_lang, &output)
            .execute()
            .await?;
        Ok(output)
    }

    async fn convert_audio(&self, audio_file: &Path, output_file: &Path, audio_lang: &str) -> Result<PathBuf> {
        info!("Converting audio file: {}", audio_file.display());
        ensure_distinct(audio_file, output_file)?;

        self.command_builder
            .convert_audio(audio_file, audio_lang, output_file)
            .execute()
            .await?;
        Ok(output_file.to_path_buf())
    }

    async fn extract_subtitle(
        &self,
        media_file: &Path,
        stream: &MediaStream,
        subtitle_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf> {
        info!("Extracting subtitle: {} [{}] from {}", stream.title, subtitle_lang, media_file.display());
        ensure_distinct(media_file, output_file)?;

        self.command_builder
            .extract_subtitle(media_file, stream, subtitle_lang, output_file)
            .execute()
            .await?;
        Ok(output_file.to_path_buf())
    }

    async fn extract_audio_with_convert(
        &self,
        media_file: &Path,
        stream: &MediaStream,
        audio_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf> {
        info!("Extracting audio: {} [{}] from {}", stream.title, audio_lang, media_file.display());
        ensure_distinct(media_file, output_file)?;

        self.command_builder
            .extract_audio(media_file, stream, audio_lang, output_file)
            .execute()
            .await?;
        Ok(output_file.to_path_buf())
    }

    async fn set_subtitle_language(&self, subtitle_file: &Path, subtitle_lang: &str) -> Result<()> {
        info!("Setting subtitle language of {} to {}", subtitle_file.display(), subtitle_lang);
        let extension = subtitle_file
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = subtitle_file.with_extension(format!("lang-tmp.{}", extension));

        self.command_builder
            .set_subtitle_language(subtitle_file, subtitle_lang, &temp)
            .execute()
            .await?;
        tokio::fs::rename(&temp, subtitle_file).await?;
        Ok(())
    }

    async fn repack(&self, job: &RepackJob) -> Result<PathBuf> {
        info!("Repacking {} -> {}", job.media_file.display(), job.output_file.display());
        ensure_distinct(&job.media_file, &job.output_file)?;

        self.command_builder.repack(job).execute().await?;
        Ok(job.output_file.clone())
    }
}

/// Factory for the FFmpeg-backed media tools
pub struct MediaToolsFactory;

impl MediaToolsFactory {
    pub fn create_prober(settings: MediaSettings) -> Arc<dyn Prober> {
        Arc::new(FfmpegProber::new(settings))
    }

    /// Transcoder after verifying the binary is installed
    pub fn create_transcoder(settings: MediaSettings) -> Result<Arc<dyn Transcoder>> {
        let transcoder = FfmpegTranscoder::new(settings);
        transcoder.check_availability()?;
        Ok(Arc::new(transcoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_file() {
        let prober = FfmpegProber::new(MediaSettings::default());
        let err = prober.probe(Path::new("/nonexistent/dir/movie.mkv")).await.unwrap_err();
        assert!(matches!(err, StreamError::FileNotFound(_)));
    }

    #[test]
    fn test_same_input_and_output_is_rejected() {
        let path = Path::new("/m/movie.mp4");
        let err = ensure_distinct(path, path).unwrap_err();
        assert_eq!(err.user_facing_code(), Some(1));
        assert!(ensure_distinct(path, Path::new("/m/movie.en.stream.mp4")).is_ok());
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let settings = MediaSettings {
            binary_path: "ffmpeg-missing-binary-7731".to_string(),
            ..MediaSettings::default()
        };
        let err = FfmpegTranscoder::new(settings).check_availability().unwrap_err();
        assert!(matches!(err, StreamError::ToolNotInstalled(_)));
    }
}
