// Media inspection and conversion
//
// - probe: parses `ffmpeg -i` dumps into MediaInfo
// - commands: ffmpeg argument construction
// - processor: FFmpeg-backed Prober and Transcoder

pub mod commands;
pub mod probe;
pub mod processor;

use async_trait::async_trait;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub use commands::*;
pub use probe::*;
pub use processor::*;

use crate::error::{Result, StreamError};

static BURNED_SUBS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"burned-subs-lang:(\w{2,3})").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "subtitle" => Some(Self::Subtitle),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        };
        f.write_str(name)
    }
}

/// One track of a media container. `index` is only meaningful within the probed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaStream {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: String,
    pub language: Option<String>,
    pub title: String,
    pub encoding_info: Option<String>,
}

impl fmt::Display for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.codec)?;
        if let Some(language) = &self.language {
            write!(f, " [{}]", language)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub filename: PathBuf,
    pub title: String,
    pub bitrate: String,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Option<Duration>,
    pub streams: Vec<MediaStream>,
    pub comment: Option<String>,
}

impl MediaInfo {
    /// First video stream; a file without one cannot be streamed
    pub fn video(&self) -> Result<&MediaStream> {
        self.streams
            .iter()
            .find(|s| s.kind == StreamKind::Video)
            .ok_or_else(|| StreamError::exit(format!("Video stream not found: {}", self.filename.display())))
    }

    pub fn audios(&self) -> Vec<&MediaStream> {
        self.streams_of(StreamKind::Audio)
    }

    pub fn subtitles(&self) -> Vec<&MediaStream> {
        self.streams_of(StreamKind::Subtitle)
    }

    pub fn streams_of(&self, kind: StreamKind) -> Vec<&MediaStream> {
        self.streams.iter().filter(|s| s.kind == kind).collect()
    }

    pub fn first_audio(&self) -> Option<&MediaStream> {
        self.streams.iter().find(|s| s.kind == StreamKind::Audio)
    }

    pub fn first_subtitle(&self) -> Option<&MediaStream> {
        self.streams.iter().find(|s| s.kind == StreamKind::Subtitle)
    }

    /// Language tag written into the container comment when subtitles were burned in
    pub fn burned_subtitles_lang(&self) -> Option<String> {
        let comment = self.comment.as_deref()?;
        BURNED_SUBS
            .captures(comment)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn serialize_duration<S: Serializer>(duration: &Option<Duration>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_str(&format_duration(*d)),
        None => serializer.serialize_none(),
    }
}

/// `hh:mm:ss.ff`, the way ffmpeg prints durations
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hundredths = duration.subsec_millis() / 10;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        hundredths
    )
}

/// Audio track going into an MP4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSelection {
    /// Separate audio file next to the video (or a converted copy)
    ExternalFile(PathBuf),
    /// Stream inside the video container
    InternalStream(MediaStream),
}

impl fmt::Display for AudioSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExternalFile(path) => write!(f, "{}", path.display()),
            Self::InternalStream(stream) => write!(f, "#{} {}", stream.index, stream),
        }
    }
}

/// Parameters for one MP4 conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mp4Job {
    pub media_file: PathBuf,
    pub output_file: PathBuf,
    pub audio: AudioSelection,
    pub audio_lang: String,
    /// Subtitle to burn in or embed; `None` leaves subtitles out of the MP4
    pub subtitle_file: Option<PathBuf>,
    pub subtitle_lang: Option<String>,
    pub burn_subtitles: bool,
}

/// Stream-preserving copy of a file keeping only the selected tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackJob {
    pub media_file: PathBuf,
    pub output_file: PathBuf,
    /// Selected audio/subtitle streams in output order
    pub streams: Vec<MediaStream>,
}

/// Media inspection tool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;
}

/// Media conversion tool. Implementations never prompt.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert_to_mp4(&self, job: &Mp4Job) -> Result<PathBuf>;

    async fn convert_subtitle_to_vtt(&self, subtitle_file: &Path, subtitle_lang: &str) -> Result<PathBuf>;

    /// Re-encode an external audio file to the browser codec
    async fn convert_audio(&self, audio_file: &Path, output_file: &Path, audio_lang: &str) -> Result<PathBuf>;

    async fn extract_subtitle(
        &self,
        media_file: &Path,
        stream: &MediaStream,
        subtitle_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf>;

    /// Pull one audio stream out of a container, re-encoding to the browser codec
    async fn extract_audio_with_convert(
        &self,
        media_file: &Path,
        stream: &MediaStream,
        audio_lang: &str,
        output_file: &Path,
    ) -> Result<PathBuf>;

    /// Write a language tag into a subtitle file in place
    async fn set_subtitle_language(&self, subtitle_file: &Path, subtitle_lang: &str) -> Result<()>;

    async fn repack(&self, job: &RepackJob) -> Result<PathBuf>;
}

/// Lowercased tag truncated to three letters; `eng`, `ENG` and `english` compare equal
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase().chars().take(3).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, kind: StreamKind, codec: &str) -> MediaStream {
        MediaStream {
            index,
            kind,
            codec: codec.to_string(),
            language: None,
            title: "movie".to_string(),
            encoding_info: None,
        }
    }

    fn info(streams: Vec<MediaStream>, comment: Option<&str>) -> MediaInfo {
        MediaInfo {
            filename: PathBuf::from("/media/movie.mkv"),
            title: "movie".to_string(),
            bitrate: String::new(),
            duration: None,
            streams,
            comment: comment.map(str::to_string),
        }
    }

    #[test]
    fn test_accessors() {
        let media = info(
            vec![
                stream(0, StreamKind::Video, "h264"),
                stream(1, StreamKind::Audio, "aac"),
                stream(2, StreamKind::Audio, "ac3"),
                stream(3, StreamKind::Subtitle, "subrip"),
            ],
            None,
        );
        assert_eq!(media.video().unwrap().codec, "h264");
        assert_eq!(media.audios().len(), 2);
        assert_eq!(media.subtitles().len(), 1);
        assert_eq!(media.first_audio().unwrap().codec, "aac");
    }

    #[test]
    fn test_missing_video_is_user_facing() {
        let media = info(vec![stream(0, StreamKind::Audio, "aac")], None);
        let err = media.video().unwrap_err();
        assert_eq!(err.user_facing_code(), Some(1));
    }

    #[test]
    fn test_burned_subtitles_lang() {
        let burned = info(vec![], Some("burned-subs-lang:spa"));
        assert_eq!(burned.burned_subtitles_lang().as_deref(), Some("spa"));

        let other = info(vec![], Some("encoded by someone"));
        assert_eq!(other.burned_subtitles_lang(), None);

        assert_eq!(info(vec![], None).burned_subtitles_lang(), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("English"), "eng");
        assert_eq!(normalize_language("SPA"), "spa");
        assert_eq!(normalize_language("en"), "en");
    }

    #[test]
    fn test_format_duration() {
        let d = Duration::from_millis(((1 * 3600 + 42 * 60 + 18) * 1000) + 50);
        assert_eq!(format_duration(d), "01:42:18.05");
    }
}
