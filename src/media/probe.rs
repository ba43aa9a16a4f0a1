use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use super::{MediaInfo, MediaStream, StreamKind};
use crate::naming::language_from_path;

static FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"from '(.+)'").expect("valid regex"));
static DURATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Duration: (.+?),").expect("valid regex"));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"comment\s+:\s+(.+)").expect("valid regex"));
static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"title\s+:\s+(.+)").expect("valid regex"));
static BITRATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"bitrate:\s+(.+)").expect("valid regex"));
static STREAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream #\d+:(\d+)(?:\[\w+\])?(?:\((\w+)\))?: (\w+): (\w+)(.*)").expect("valid regex")
});

/// Parsed media info plus one diagnostic per line that could not be understood
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub info: MediaInfo,
    pub diagnostics: Vec<String>,
}

enum Current {
    Nothing,
    Stream(MediaStream),
    Skipped,
}

/// Parse the text `ffmpeg -i <file> -hide_banner` prints.
///
/// Never fails: unknown or malformed lines become diagnostics.
pub fn parse_probe_output(output: &str, path: &Path) -> ProbeOutput {
    let default_lang = language_from_path(path);
    let default_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();

    let mut filename: PathBuf = path.to_path_buf();
    let mut title = String::new();
    let mut bitrate = String::new();
    let mut comment = None;
    let mut duration = None;
    let mut streams = Vec::new();
    let mut diagnostics = Vec::new();
    let mut current = Current::Nothing;

    let mut diagnose = |what: &str, line: &str| {
        diagnostics.push(format!("{} | Cannot parse {} from line: {}", path.display(), what, line));
    };

    for line in output.lines().map(str::trim) {
        if line.contains("Estimating duration from bitrate") {
            continue;
        }

        if line.starts_with("Input #") {
            match FROM.captures(line) {
                Some(caps) => filename = PathBuf::from(&caps[1]),
                None => diagnose("filename", line),
            }
        }

        if line.starts_with("Duration:") {
            match DURATION.captures(line) {
                Some(caps) if &caps[1] == "N/A" => {}
                Some(caps) => match parse_duration(&caps[1]) {
                    Some(parsed) => duration = Some(parsed),
                    None => diagnose("duration", line),
                },
                None => diagnose("duration", line),
            }
        }

        if line.contains("bitrate:") {
            match BITRATE.captures(line) {
                Some(caps) if &caps[1] == "N/A" => {}
                Some(caps) => bitrate = caps[1].trim().to_string(),
                None => diagnose("bitrate", line),
            }
        }

        if line.starts_with("comment") {
            match COMMENT.captures(line) {
                Some(caps) => comment = Some(caps[1].trim().to_string()),
                None => diagnose("comment", line),
            }
        }

        if line.starts_with("title") {
            match (TITLE.captures(line), &mut current) {
                (Some(caps), Current::Nothing) => title = caps[1].trim().to_string(),
                (Some(caps), Current::Stream(stream)) => stream.title = caps[1].trim().to_string(),
                (Some(_), Current::Skipped) => {}
                (None, _) => diagnose("title", line),
            }
        }

        if line.starts_with("Stream #") {
            if let Current::Stream(stream) = std::mem::replace(&mut current, Current::Skipped) {
                streams.push(finish_stream(stream, &default_title));
            }
            let Some(caps) = STREAM.captures(line) else {
                diagnose("stream info", line);
                continue;
            };
            let Some(kind) = StreamKind::parse(&caps[3]) else {
                diagnose("stream kind", line);
                continue;
            };
            let Ok(index) = caps[1].parse::<usize>() else {
                diagnose("stream index", line);
                continue;
            };
            let rest = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
            let encoding_info = rest.split_once(',').map(|(_, tail)| tail).unwrap_or(rest).trim();

            current = Current::Stream(MediaStream {
                index,
                kind,
                codec: caps[4].trim().to_lowercase(),
                language: caps
                    .get(2)
                    .map(|m| m.as_str().to_lowercase())
                    .or_else(|| default_lang.clone()),
                title: String::new(),
                encoding_info: (!encoding_info.is_empty()).then(|| encoding_info.to_string()),
            });
        }
    }

    if let Current::Stream(stream) = current {
        streams.push(finish_stream(stream, &default_title));
    }

    let filename = std::path::absolute(&filename).unwrap_or(filename);

    ProbeOutput {
        info: MediaInfo {
            filename,
            title: if title.is_empty() { default_title } else { title },
            bitrate,
            duration,
            streams,
            comment,
        },
        diagnostics,
    }
}

fn finish_stream(mut stream: MediaStream, default_title: &str) -> MediaStream {
    if stream.title.is_empty() {
        stream.title = default_title.to_string();
    }
    stream
}

/// `01:42:18.05` -> 1h 42m 18.05s
pub fn parse_duration(text: &str) -> Option<Duration> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MKV_DUMP: &str = r#"Input #0, matroska,webm, from '/media/movie.mkv':
  Metadata:
    title           : The Movie
    comment         : burned-subs-lang:eng
    ENCODER         : Lavf60.3.100
  Duration: 01:42:18.05, start: 0.000000, bitrate: 3562 kb/s
  Stream #0:0: Video: h264 (High), yuv420p(progressive), 1920x1080, SAR 1:1 DAR 16:9, 23.98 fps (default)
    Metadata:
      title           : Main video
  Stream #0:1(eng): Audio: aac (LC), 48000 Hz, stereo, fltp (default)
  Stream #0:2(spa): Audio: ac3, 48000 Hz, 5.1(side), fltp, 384 kb/s
    Metadata:
      title           : Castellano
  Stream #0:3(eng): Subtitle: subrip
  Stream #0:4: Attachment: ttf
    Metadata:
      title           : font
At least one output file must be specified"#;

    #[test]
    fn test_parse_full_dump() {
        let out = parse_probe_output(MKV_DUMP, Path::new("/media/movie.mkv"));
        let info = out.info;

        assert_eq!(info.filename, PathBuf::from("/media/movie.mkv"));
        assert_eq!(info.title, "The Movie");
        assert_eq!(info.bitrate, "3562 kb/s");
        assert_eq!(info.comment.as_deref(), Some("burned-subs-lang:eng"));
        assert_eq!(info.burned_subtitles_lang().as_deref(), Some("eng"));
        assert_eq!(info.duration, parse_duration("01:42:18.05"));
        assert_eq!(info.streams.len(), 4);

        let video = info.video().unwrap();
        assert_eq!(video.title, "Main video");
        assert_eq!(video.language, None);

        let audios = info.audios();
        assert_eq!(audios[0].codec, "aac");
        assert_eq!(audios[0].language.as_deref(), Some("eng"));
        assert_eq!(audios[0].title, "movie");
        assert_eq!(audios[1].index, 2);
        assert_eq!(audios[1].title, "Castellano");
        assert_eq!(audios[1].encoding_info.as_deref(), Some("48000 Hz, 5.1(side), fltp, 384 kb/s"));

        assert_eq!(info.subtitles()[0].codec, "subrip");
        // attachment stream skipped with a diagnostic, its title ignored
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].contains("stream kind"));
    }

    #[test]
    fn test_stream_id_segment_is_optional() {
        let dump = "  Stream #0:1[0x1100](fra): Audio: ac3 (AC-3 / 0x2000), 48000 Hz, stereo";
        let out = parse_probe_output(dump, Path::new("/media/film.ts"));
        assert_eq!(out.info.streams.len(), 1);
        assert_eq!(out.info.streams[0].index, 1);
        assert_eq!(out.info.streams[0].language.as_deref(), Some("fra"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_default_language_from_path() {
        let dump = "  Stream #0:0: Audio: ac3, 48000 Hz, stereo";
        let out = parse_probe_output(dump, Path::new("/media/my_movie.fra.ac3"));
        let audio = &out.info.streams[0];
        assert_eq!(audio.language.as_deref(), Some("fra"));
        assert_eq!(audio.title, "my movie.fra");
    }

    #[test]
    fn test_not_available_values() {
        let dump = "  Duration: N/A, start: 0.000000, bitrate: N/A\n  Stream #0:0: Subtitle: ass";
        let out = parse_probe_output(dump, Path::new("/media/subs.ass"));
        assert_eq!(out.info.duration, None);
        assert_eq!(out.info.bitrate, "");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_bad_lines_never_abort() {
        let dump = "  Stream #garbage\n  Duration: broken\n  Stream #0:0: Video: hevc";
        let out = parse_probe_output(dump, Path::new("/media/x.mkv"));
        assert_eq!(out.info.streams.len(), 1);
        assert_eq!(out.diagnostics.len(), 2);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("00:00:01.50"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("nonsense"), None);
    }
}
