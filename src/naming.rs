//! Canonical names for derived files.
//!
//! `movie.mkv` converted for Spanish audio becomes `movie.sp.stream.mp4`;
//! feeding that name back in with the same codec and language yields the
//! same path, so a produced artifact is always found again.

use std::path::{Path, PathBuf};

pub const STREAM_SUFFIX: &str = "stream";
pub const REPACK_SUFFIX: &str = "repack";

/// Cache path for `source` converted to `codec` with audio `language`
pub fn cache_path(source: &Path, codec: &str, language: &str) -> PathBuf {
    cache_path_with_suffix(source, codec, language, STREAM_SUFFIX)
}

pub fn cache_path_with_suffix(source: &Path, codec: &str, language: &str, suffix: &str) -> PathBuf {
    let language: String = language.to_lowercase().chars().take(2).collect();
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let marker = format!(".{}", suffix);
    let segments: Vec<&str> = stem.split('.').collect();
    let stripped: Vec<&str> = segments
        .iter()
        .enumerate()
        .filter(|(i, segment)| *i == 0 || format!(".{}", segment) != marker)
        .map(|(_, segment)| *segment)
        .collect();

    let name = match stripped.split_last() {
        Some((last, rest)) if !rest.is_empty() && last.chars().count() <= 3 => rest.join("."),
        _ => stripped.join("."),
    };

    source.with_file_name(format!("{}.{}.{}.{}", name, language, suffix, codec))
}

/// Language tag taken from a trailing `.xx`/`.xxx` segment before the extension
pub fn language_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    let (_, candidate) = stem.rsplit_once('.')?;
    let len = candidate.chars().count();
    if (2..=3).contains(&len) && candidate.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(candidate.to_lowercase())
    } else {
        None
    }
}

/// Whether the file name carries a `.<suffix>` cache marker
pub fn has_marker(stem: &str, suffix: &str) -> bool {
    stem.split('.').skip(1).any(|segment| segment == suffix)
}

/// Lowercase extension without the dot
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// File extension for a subtitle stream extracted with `codec`
pub fn subtitle_extension(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "ass" => "ass",
        "ssa" => "ssa",
        "webvtt" => "vtt",
        "dvd_subtitle" => "sub",
        "hdmv_pgs_subtitle" => "sup",
        _ => "srt",
    }
}

/// `<stem>.<lang2>.<ext>` next to the video for an extracted subtitle
pub fn extracted_subtitle_path(media_file: &Path, codec: &str, language: &str) -> PathBuf {
    let stem = media_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let language: String = language.to_lowercase().chars().take(2).collect();
    media_file.with_file_name(format!("{}.{}.{}", stem, language, subtitle_extension(codec)))
}
