use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::fs::video_files;
use crate::naming::{STREAM_SUFFIX, has_marker};

/// Stems that say nothing about an episode
const PLACEHOLDER_STEMS: &[&str] = &["video", "movie", "film"];

static SEPARATOR_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_]+").expect("valid regex"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Video files directly inside `directory`, sorted by name
pub fn episode_files(directory: &Path) -> Vec<PathBuf> {
    video_files(directory, 0)
}

/// Whether the videos directly inside `directory` look like episodes of one show
pub fn is_tv_show_directory(directory: &Path) -> bool {
    is_tv_show(&file_stems(&episode_files(directory)))
}

/// Files that can be episodes: no placeholder names, no previously produced artifacts
pub fn candidate_files(files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|p| p.file_stem().is_some_and(|s| is_candidate_stem(&s.to_string_lossy())))
        .cloned()
        .collect()
}

pub fn file_stems(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect()
}

fn is_candidate_stem(stem: &str) -> bool {
    !PLACEHOLDER_STEMS.contains(&stem.to_lowercase().as_str()) && !has_marker(stem, STREAM_SUFFIX)
}

pub fn is_tv_show(stems: &[String]) -> bool {
    let stems = candidate_stems(stems);
    if stems.len() < 2 {
        return false;
    }

    let numbers: HashSet<u64> = episode_numbers(&stems).into_iter().flatten().collect();
    numbers.len() >= 2 && numbers.len() * 2 >= stems.len()
}

/// Stems with placeholders and previously produced artifacts removed
fn candidate_stems(stems: &[String]) -> Vec<String> {
    stems
        .iter()
        .filter(|s| is_candidate_stem(s))
        .map(|s| SEPARATOR_RUNS.replace_all(s.trim(), "_").to_string())
        .collect()
}

/// Episode number of each stem: the first digit run after the shared prefix
pub fn episode_numbers(stems: &[String]) -> Vec<Option<u64>> {
    let mut prefix = common_prefix(stems.iter().map(String::as_str));
    if prefix.is_empty() {
        let heads: Vec<&str> = stems.iter().map(|s| before_first_digit(s)).collect();
        prefix = common_prefix(heads.into_iter());
    }
    // a shared leading digit belongs to the episode number
    let prefix = prefix.trim_end_matches(|c: char| c.is_ascii_digit());

    stems
        .iter()
        .map(|stem| {
            let remainder = stem.get(prefix.len()..).unwrap_or_default();
            DIGITS.find(remainder).and_then(|m| m.as_str().parse().ok())
        })
        .collect()
}

fn before_first_digit(stem: &str) -> &str {
    match stem.find(|c: char| c.is_ascii_digit()) {
        Some(position) => &stem[..position],
        None => stem,
    }
}

fn common_prefix<'a, I: Iterator<Item = &'a str>>(mut strings: I) -> String {
    let Some(first) = strings.next() else {
        return String::new();
    };
    let mut prefix: &str = first;
    for s in strings {
        let shared = prefix
            .char_indices()
            .zip(s.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, a), _)| i + a.len_utf8())
            .unwrap_or(0);
        prefix = &prefix[..shared];
    }
    prefix.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    fn stems(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numbered_episodes_are_a_show() {
        let names = stems(&["Show S01E01", "Show S01E02", "Show S01E03", "Show S01E04"]);
        assert!(is_tv_show(&names));
        assert_eq!(
            episode_numbers(&candidate_stems(&names)),
            vec![Some(1), Some(2), Some(3), Some(4)]
        );
    }

    #[test]
    fn test_unrelated_names_are_not_a_show() {
        let names = stems(&["RandomMovie1", "CompletelyDifferentName", "AnotherRandomFile"]);
        assert!(!is_tv_show(&names));
    }

    #[test]
    fn test_cache_markers_are_ignored() {
        let names = stems(&[
            "Episode 01",
            "Episode 01.stream",
            "Episode 02",
            "Episode 02.stream",
            "Episode 03",
        ]);
        assert_eq!(candidate_stems(&names).len(), 3);
        assert!(is_tv_show(&names));
    }

    #[test]
    fn test_candidate_files_drop_artifacts_and_placeholders() {
        let files: Vec<PathBuf> = ["Show E01.mkv", "Show E01.en.stream.mp4", "Movie.mkv", "Show E02.mkv"]
            .iter()
            .map(|name| Path::new("/shows").join(name))
            .collect();
        assert_eq!(
            candidate_files(&files),
            vec![PathBuf::from("/shows/Show E01.mkv"), PathBuf::from("/shows/Show E02.mkv")]
        );
    }

    #[test]
    fn test_single_file_and_placeholders() {
        assert!(!is_tv_show(&stems(&["Episode 01"])));
        assert!(!is_tv_show(&stems(&["movie", "Episode 01"])));
    }

    #[test]
    fn test_shared_leading_digit_stays_in_number() {
        let names = stems(&["ep_10", "ep_11", "ep_12"]);
        assert_eq!(episode_numbers(&names), vec![Some(10), Some(11), Some(12)]);
    }

    #[test]
    fn test_prefix_fallback_without_common_prefix() {
        let names = stems(&["a 1", "b 2"]);
        assert_eq!(episode_numbers(&names), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_directory_detection() {
        let temp = TempDir::new().unwrap();
        for name in ["Show_E01.mkv", "Show_E02.mkv", "Show_E01.en.stream.mp4", "notes.txt"] {
            std::fs::write(temp.path().join(name), b"").unwrap();
        }
        assert!(is_tv_show_directory(temp.path()));
        assert_eq!(episode_files(temp.path()).len(), 3);
    }
}
