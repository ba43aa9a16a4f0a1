use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::matcher::same_language;
use crate::media::{MediaInfo, MediaStream, Prober};
use crate::naming::{cache_path, extension};

/// What the MP4 being streamed has to contain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub audio_lang: String,
    /// Audio taken from a stream inside the source container
    pub audio_stream: Option<MediaStream>,
    /// Audio taken from a separate file
    pub audio_file: Option<PathBuf>,
    /// Subtitle that must be embedded as a track
    pub subtitle_file: Option<PathBuf>,
    pub subtitle_lang: Option<String>,
    pub burn_subtitles: bool,
}

/// Whether `candidate` satisfies every constraint of `request`.
///
/// `audio_file_info` is the probed `request.audio_file`, when one was requested.
pub fn matches_request(candidate: &MediaInfo, request: &ArtifactRequest, audio_file_info: Option<&MediaInfo>) -> bool {
    let name = candidate
        .filename
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let first_audio = candidate.first_audio();

    if request.burn_subtitles {
        let burned = candidate.burned_subtitles_lang();
        let wanted = request.subtitle_lang.as_deref();
        match (burned.as_deref(), wanted) {
            (Some(burned), Some(wanted)) if same_language(burned, wanted) => {}
            (Some(burned), _) => {
                debug!("Match {} | Burned subtitle language mismatch: {} != {:?}", name, burned, wanted);
                return false;
            }
            (None, _) => {
                debug!("Match {} | Burned subtitles not found", name);
                return false;
            }
        }
    }

    if let Some(stream) = &request.audio_stream {
        match first_audio {
            Some(audio) if audio.codec.eq_ignore_ascii_case(&stream.codec) => {}
            other => {
                debug!(
                    "Match {} | Audio codec mismatch: {:?} != {}",
                    name,
                    other.map(|a| a.codec.as_str()),
                    stream.codec
                );
                return false;
            }
        }
    }

    if request.audio_file.is_some() {
        let wanted = audio_file_info.and_then(MediaInfo::first_audio);
        match (first_audio, wanted) {
            (Some(audio), Some(wanted)) if audio.codec.eq_ignore_ascii_case(&wanted.codec) => {}
            (audio, wanted) => {
                debug!(
                    "Match {} | Audio file codec mismatch: {:?} != {:?}",
                    name,
                    audio.map(|a| a.codec.as_str()),
                    wanted.map(|a| a.codec.as_str())
                );
                return false;
            }
        }
    }

    if request.subtitle_file.is_some() {
        let subtitles = candidate.subtitles();
        if subtitles.is_empty() {
            debug!("Match {} | Subtitle track not found", name);
            return false;
        }
        let wanted = request.subtitle_lang.as_deref().unwrap_or_default();
        let found = subtitles
            .iter()
            .any(|s| s.language.as_deref().is_some_and(|l| same_language(l, wanted)));
        if !found {
            debug!("Match {} | Subtitle language mismatch: wanted {}", name, wanted);
            return false;
        }
    }

    true
}

/// Previously produced MP4 that already satisfies `request`, if any.
///
/// Checks the source itself when it is an MP4, then its canonical cache path.
pub async fn find_matching_artifact(
    prober: &dyn Prober,
    media_file: &Path,
    request: &ArtifactRequest,
) -> Result<Option<PathBuf>> {
    let audio_file_info = match &request.audio_file {
        Some(path) => Some(prober.probe(path).await?),
        None => None,
    };

    if extension(media_file) == "mp4" {
        let info = prober.probe(media_file).await?;
        if matches_request(&info, request, audio_file_info.as_ref()) {
            return Ok(Some(media_file.to_path_buf()));
        }
    }

    let cached = cache_path(media_file, "mp4", &request.audio_lang);
    if cached != media_file && cached.exists() {
        let info = prober.probe(&cached).await?;
        if matches_request(&info, request, audio_file_info.as_ref()) {
            return Ok(Some(cached));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MockProber, StreamKind};
    use assert_fs::TempDir;

    fn stream(index: usize, kind: StreamKind, codec: &str, language: Option<&str>) -> MediaStream {
        MediaStream {
            index,
            kind,
            codec: codec.to_string(),
            language: language.map(str::to_string),
            title: "movie".to_string(),
            encoding_info: None,
        }
    }

    fn info(path: &Path, streams: Vec<MediaStream>, comment: Option<&str>) -> MediaInfo {
        MediaInfo {
            filename: path.to_path_buf(),
            title: "movie".to_string(),
            bitrate: String::new(),
            duration: None,
            streams,
            comment: comment.map(str::to_string),
        }
    }

    /// MP4 built with aac audio and an embedded `eng` subtitle
    fn produced(path: &Path) -> MediaInfo {
        info(
            path,
            vec![
                stream(0, StreamKind::Video, "h264", None),
                stream(1, StreamKind::Audio, "aac", Some("spa")),
                stream(2, StreamKind::Subtitle, "mov_text", Some("eng")),
            ],
            None,
        )
    }

    fn embed_request(subtitle_lang: &str) -> ArtifactRequest {
        ArtifactRequest {
            audio_lang: "spa".to_string(),
            audio_stream: Some(stream(2, StreamKind::Audio, "aac", Some("spa"))),
            subtitle_file: Some(PathBuf::from("/m/movie.en.srt")),
            subtitle_lang: Some(subtitle_lang.to_string()),
            ..ArtifactRequest::default()
        }
    }

    #[test]
    fn test_absent_constraints_are_vacuous() {
        let candidate = info(Path::new("/m/x.mp4"), vec![], None);
        assert!(matches_request(&candidate, &ArtifactRequest::default(), None));
    }

    #[test]
    fn test_burn_requires_matching_tag() {
        let request = ArtifactRequest {
            burn_subtitles: true,
            subtitle_lang: Some("eng".to_string()),
            ..ArtifactRequest::default()
        };
        let tagged = info(Path::new("/m/x.mp4"), vec![], Some("burned-subs-lang:eng"));
        let other = info(Path::new("/m/x.mp4"), vec![], Some("burned-subs-lang:fre"));
        let untagged = info(Path::new("/m/x.mp4"), vec![], None);

        assert!(matches_request(&tagged, &request, None));
        assert!(!matches_request(&other, &request, None));
        assert!(!matches_request(&untagged, &request, None));
    }

    #[test]
    fn test_external_audio_compares_codec_to_codec() {
        let request = ArtifactRequest {
            audio_file: Some(PathBuf::from("/m/movie.en.stream.aac")),
            ..ArtifactRequest::default()
        };
        let candidate = produced(Path::new("/m/movie.sp.stream.mp4"));
        let aac_file = info(
            Path::new("/m/movie.en.stream.aac"),
            vec![stream(0, StreamKind::Audio, "aac", Some("eng"))],
            None,
        );
        let ac3_file = info(
            Path::new("/m/movie.ac3"),
            vec![stream(0, StreamKind::Audio, "ac3", Some("eng"))],
            None,
        );

        assert!(matches_request(&candidate, &request, Some(&aac_file)));
        assert!(!matches_request(&candidate, &request, Some(&ac3_file)));
        assert!(!matches_request(&candidate, &request, None));
    }

    #[test]
    fn test_missing_audio_fails_audio_check() {
        let candidate = info(Path::new("/m/x.mp4"), vec![stream(0, StreamKind::Video, "h264", None)], None);
        assert!(!matches_request(&candidate, &embed_request("eng"), None));
    }

    #[tokio::test]
    async fn test_produced_artifact_is_found() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("movie.mkv");
        let cached = temp.path().join("movie.sp.stream.mp4");
        std::fs::write(&source, b"").unwrap();
        std::fs::write(&cached, b"").unwrap();

        let mut prober = MockProber::new();
        let expected = cached.clone();
        prober
            .expect_probe()
            .withf(move |path| path == expected.as_path())
            .returning(|path| Ok(produced(path)));

        let found = find_matching_artifact(&prober, &source, &embed_request("eng")).await.unwrap();
        assert_eq!(found, Some(cached));
    }

    #[tokio::test]
    async fn test_different_subtitle_language_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("movie.mkv");
        let cached = temp.path().join("movie.sp.stream.mp4");
        std::fs::write(&source, b"").unwrap();
        std::fs::write(&cached, b"").unwrap();

        let mut prober = MockProber::new();
        prober.expect_probe().returning(|path| Ok(produced(path)));

        let found = find_matching_artifact(&prober, &source, &embed_request("fre")).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_mp4_source_is_reused() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("movie.mp4");
        std::fs::write(&source, b"").unwrap();

        let mut prober = MockProber::new();
        prober.expect_probe().times(1).returning(|path| Ok(produced(path)));

        let found = find_matching_artifact(&prober, &source, &embed_request("eng")).await.unwrap();
        assert_eq!(found, Some(source));
    }

    #[tokio::test]
    async fn test_nothing_on_disk_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("movie.mkv");

        let mut prober = MockProber::new();
        prober.expect_probe().never();

        let found = find_matching_artifact(&prober, &source, &embed_request("eng")).await.unwrap();
        assert_eq!(found, None);
    }
}
