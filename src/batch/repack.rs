use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Result, StreamError};
use crate::matcher::{SelectedStream, language_key};
use crate::media::{MediaInfo, MediaStream, Prober, RepackJob, StreamKind, Transcoder};
use crate::naming::{REPACK_SUFFIX, cache_path_with_suffix, extension};
use crate::prompt::Prompt;

/// Stream counts per `(kind, language)` referenced by a selection, sorted
pub type Signature = Vec<((StreamKind, Option<String>), usize)>;

/// Files that share one stream selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackGroup {
    pub files: Vec<PathBuf>,
    pub selected_streams: Vec<SelectedStream>,
}

/// Audio and subtitle streams in container order; selections index into this list
pub fn selectable_streams(info: &MediaInfo) -> Vec<&MediaStream> {
    info.streams
        .iter()
        .filter(|s| matches!(s.kind, StreamKind::Audio | StreamKind::Subtitle))
        .collect()
}

pub fn signature(info: &MediaInfo, selection: &[SelectedStream]) -> Signature {
    let mut counts: BTreeMap<(StreamKind, Option<String>), usize> = BTreeMap::new();
    for selected in selection {
        counts.entry((selected.kind, selected.language.clone())).or_insert(0);
    }
    for stream in &info.streams {
        let key = (stream.kind, language_key(stream.language.as_deref()));
        if let Some(count) = counts.get_mut(&key) {
            *count += 1;
        }
    }
    counts.into_iter().collect()
}

/// Split `infos` into those whose signature equals the reference's and the rest
pub fn group_by_signature(
    reference: &MediaInfo,
    selection: &[SelectedStream],
    infos: Vec<MediaInfo>,
) -> (Vec<MediaInfo>, Vec<MediaInfo>) {
    let expected = signature(reference, selection);
    infos
        .into_iter()
        .partition(|info| signature(info, selection) == expected)
}

fn label(stream: &MediaStream) -> String {
    format!(
        "#{} {} [{}] {} ({})",
        stream.index,
        stream.kind,
        stream.language.as_deref().unwrap_or("-"),
        stream.title,
        stream.codec
    )
}

/// Ask which streams to keep, pre-checking streams in `seed_languages`
fn select_streams(
    prompt: &dyn Prompt,
    reference: &MediaInfo,
    seed_languages: &[(StreamKind, Option<String>)],
) -> Result<Vec<SelectedStream>> {
    let streams = selectable_streams(reference);
    let labels: Vec<String> = streams.iter().map(|s| label(s)).collect();
    let mut defaults: Vec<usize> = streams
        .iter()
        .enumerate()
        .filter(|(_, s)| seed_languages.contains(&(s.kind, language_key(s.language.as_deref()))))
        .map(|(i, _)| i)
        .collect();
    if defaults.is_empty() {
        defaults = streams
            .iter()
            .position(|s| s.kind == StreamKind::Audio)
            .into_iter()
            .collect();
    }

    let message = format!("Select streams to keep for {}", reference.filename.display());
    let chosen = prompt.select_many(&message, &labels, &defaults)?;
    Ok(chosen
        .into_iter()
        .filter_map(|i| SelectedStream::from_position(&streams, i))
        .collect())
}

/// Group `files` by stream layout, asking for a selection per distinct layout.
///
/// The first file is the reference; files whose signature matches it join its
/// group silently, and the first file of every other layout gets a fresh
/// selection pre-seeded with the languages chosen before.
pub async fn confirm_repack(prober: &dyn Prober, prompt: &dyn Prompt, files: &[PathBuf]) -> Result<Vec<RepackGroup>> {
    let mut pending = Vec::with_capacity(files.len());
    for file in files {
        pending.push(prober.probe(file).await?);
    }

    let mut groups = Vec::new();
    let mut seed_languages: Vec<(StreamKind, Option<String>)> = Vec::new();
    while !pending.is_empty() {
        let reference = pending.remove(0);
        let selection = select_streams(prompt, &reference, &seed_languages)?;
        if selection.is_empty() {
            warn!("No streams selected, skipping {}", reference.filename.display());
            continue;
        }
        seed_languages = selection.iter().map(|s| (s.kind, s.language.clone())).collect();

        let (same, rest) = group_by_signature(&reference, &selection, pending);
        if !rest.is_empty() {
            info!("{} files have a different stream layout", rest.len());
        }
        let mut files = vec![reference.filename.clone()];
        files.extend(same.into_iter().map(|info| info.filename));
        groups.push(RepackGroup {
            files,
            selected_streams: selection,
        });
        pending = rest;
    }
    Ok(groups)
}

/// `<stem>.<lang2>.repack.<ext>` next to the source, language of the first kept audio
pub fn repack_output(media_file: &Path, streams: &[MediaStream]) -> PathBuf {
    let language = streams
        .iter()
        .find(|s| s.kind == StreamKind::Audio)
        .and_then(|s| s.language.clone())
        .unwrap_or_else(|| "un".to_string());
    cache_path_with_suffix(media_file, &extension(media_file), &language, REPACK_SUFFIX)
}

/// Build the repack job for one member of a group
pub fn plan_file(info: &MediaInfo, selection: &[SelectedStream]) -> Result<RepackJob> {
    let streams = selectable_streams(info);
    let mut kept = Vec::with_capacity(selection.len());
    for selected in selection {
        let index = selected.resolve(&streams).ok_or_else(|| {
            StreamError::Media(format!(
                "{} has no {} stream #{} for language {:?}",
                info.filename.display(),
                selected.kind,
                selected.position,
                selected.language
            ))
        })?;
        kept.push(streams[index].clone());
    }
    Ok(RepackJob {
        media_file: info.filename.clone(),
        output_file: repack_output(&info.filename, &kept),
        streams: kept,
    })
}

/// Repack every file of every group; failures are logged and skipped
pub async fn run_repack(prober: &dyn Prober, transcoder: &dyn Transcoder, groups: &[RepackGroup]) -> Result<Vec<PathBuf>> {
    let mut produced = Vec::new();
    for group in groups {
        for file in &group.files {
            match repack_file(prober, transcoder, file, &group.selected_streams).await {
                Ok(output) => produced.push(output),
                Err(e) => warn!("Failed to repack {}: {}", file.display(), e),
            }
        }
    }
    info!("Repacked {} files", produced.len());
    Ok(produced)
}

async fn repack_file(
    prober: &dyn Prober,
    transcoder: &dyn Transcoder,
    file: &Path,
    selection: &[SelectedStream],
) -> Result<PathBuf> {
    let info = prober.probe(file).await?;
    let job = plan_file(&info, selection)?;
    transcoder.repack(&job).await
}
