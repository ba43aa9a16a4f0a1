use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::media::{AudioSelection, MediaStream, StreamKind, normalize_language};
use crate::prompt::{Prompt, prompt_language};

/// Streams with no language tag match every requested language
pub fn language_matches(candidate: Option<&str>, desired: &str) -> bool {
    match candidate {
        None => true,
        Some(language) => same_language(language, desired),
    }
}

/// Case-insensitive comparison on the first two letters (`en`, `eng`, `English`)
pub fn same_language(a: &str, b: &str) -> bool {
    let prefix = |s: &str| s.trim().to_lowercase().chars().take(2).collect::<String>();
    prefix(a) == prefix(b)
}

/// Audio codec differs from what browsers play
pub fn requires_transcoding(stream: &MediaStream, browser_codec: &str) -> bool {
    !stream.codec.eq_ignore_ascii_case(browser_codec)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCandidate {
    pub path: PathBuf,
    pub stream: MediaStream,
}

/// Internal streams of the video followed by candidate files next to it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub internal: Vec<MediaStream>,
    pub external: Vec<ExternalCandidate>,
}

impl Candidates {
    pub fn new(internal: Vec<MediaStream>, external: Vec<ExternalCandidate>) -> Self {
        Self { internal, external }
    }

    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All streams in option order: internal first, then external
    pub fn streams(&self) -> Vec<&MediaStream> {
        self.internal
            .iter()
            .chain(self.external.iter().map(|c| &c.stream))
            .collect()
    }

    /// Map an option index onto the concatenated internal ++ external list
    pub fn resolve_index(&self, index: usize) -> Option<Picked> {
        if index < self.internal.len() {
            return Some(Picked::Internal(self.internal[index].clone()));
        }
        self.external.get(index - self.internal.len()).map(|c| Picked::External {
            path: c.path.clone(),
            stream: c.stream.clone(),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        let internal = self
            .internal
            .iter()
            .map(|s| format!("[{}] {} ({})", s.language.as_deref().unwrap_or("-"), s.title, s.codec));
        let external = self.external.iter().map(|c| {
            let parent = c
                .path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            format!(
                "ext [{}] {} / {} ({})",
                c.stream.language.as_deref().unwrap_or("-"),
                parent,
                c.stream.title,
                c.stream.codec
            )
        });
        internal.chain(external).collect()
    }

    /// Keep candidates matching `desired`; with zero matches keep everything
    pub fn filter_by_language(self, desired: &str) -> (Self, bool) {
        let internal: Vec<MediaStream> = self
            .internal
            .iter()
            .filter(|s| language_matches(s.language.as_deref(), desired))
            .cloned()
            .collect();
        let external: Vec<ExternalCandidate> = self
            .external
            .iter()
            .filter(|c| language_matches(c.stream.language.as_deref(), desired))
            .cloned()
            .collect();

        if internal.is_empty() && external.is_empty() {
            return (self, false);
        }
        (Self { internal, external }, true)
    }
}

/// A chosen candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Picked {
    Internal(MediaStream),
    External { path: PathBuf, stream: MediaStream },
}

impl Picked {
    pub fn stream(&self) -> &MediaStream {
        match self {
            Self::Internal(stream) => stream,
            Self::External { stream, .. } => stream,
        }
    }

    pub fn into_audio_selection(self) -> AudioSelection {
        match self {
            Self::Internal(stream) => AudioSelection::InternalStream(stream),
            Self::External { path, .. } => AudioSelection::ExternalFile(path),
        }
    }
}

/// Stream identity that survives index shifts between sibling files:
/// the Nth stream of a given kind and language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectedStream {
    pub kind: StreamKind,
    pub language: Option<String>,
    pub position: usize,
}

impl SelectedStream {
    /// Identity of `streams[chosen]` within `streams`
    pub fn from_position(streams: &[&MediaStream], chosen: usize) -> Option<Self> {
        let target = streams.get(chosen)?;
        let key = language_key(target.language.as_deref());
        let position = streams[..chosen]
            .iter()
            .filter(|s| s.kind == target.kind && language_key(s.language.as_deref()) == key)
            .count();
        Some(Self {
            kind: target.kind,
            language: key,
            position,
        })
    }

    /// Index into `streams` of the stream with this identity
    pub fn resolve(&self, streams: &[&MediaStream]) -> Option<usize> {
        streams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == self.kind && language_key(s.language.as_deref()) == self.language)
            .nth(self.position)
            .map(|(i, _)| i)
    }
}

pub fn language_key(language: Option<&str>) -> Option<String> {
    language.map(normalize_language)
}

/// Result of a stream selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMatch {
    pub picked: Picked,
    /// Language of the chosen stream, falling back to the requested one or the user's answer
    pub language: String,
    pub identity: SelectedStream,
}

impl StreamMatch {
    pub fn requires_transcoding(&self, browser_codec: &str) -> bool {
        requires_transcoding(self.picked.stream(), browser_codec)
    }
}

/// Pick one candidate.
///
/// A replayed identity wins when it resolves; otherwise a unique match in
/// language-targeted mode is taken without asking, and anything else goes to
/// the prompt.
pub fn choose(
    kind: StreamKind,
    desired: Option<&str>,
    candidates: Candidates,
    replay: Option<&SelectedStream>,
    prompt: &dyn Prompt,
) -> Result<Option<(Picked, SelectedStream)>> {
    let candidates = match desired {
        Some(language) => {
            let (filtered, matched) = candidates.filter_by_language(language);
            if !matched {
                warn!("No {} found for language: {}", kind, language);
            }
            filtered
        }
        None => candidates,
    };
    if candidates.is_empty() {
        return Ok(None);
    }

    let streams = candidates.streams();
    let index = match replay.and_then(|identity| identity.resolve(&streams)) {
        Some(index) => {
            debug!("Replaying {} selection: {:?}", kind, replay);
            index
        }
        None if desired.is_some() && candidates.len() == 1 => 0,
        None => prompt.select_one(&format!("Select {} stream", kind), &candidates.labels())?,
    };

    let identity = SelectedStream::from_position(&streams, index)
        .ok_or_else(|| StreamError::Prompt(format!("Selected option out of range: {}", index)))?;
    let picked = candidates
        .resolve_index(index)
        .ok_or_else(|| StreamError::Prompt(format!("Selected option out of range: {}", index)))?;
    Ok(Some((picked, identity)))
}

fn resolve_language(picked: &Picked, desired: Option<&str>, prompt: &dyn Prompt) -> Result<String> {
    let stream = picked.stream();
    if let Some(language) = &stream.language {
        return Ok(language.to_lowercase());
    }
    if let Some(language) = desired {
        return Ok(language.to_lowercase());
    }
    let what = match picked {
        Picked::External { path, .. } => format!("{} file: {}", stream.kind, path.display()),
        Picked::Internal(stream) => format!("{}: {}", stream.kind, stream),
    };
    prompt_language(prompt, &what)
}

/// Choose the audio track; audio is mandatory
pub fn select_audio(
    desired: Option<&str>,
    candidates: Candidates,
    replay: Option<&SelectedStream>,
    prompt: &dyn Prompt,
) -> Result<StreamMatch> {
    let (picked, identity) = choose(StreamKind::Audio, desired, candidates, replay, prompt)?
        .ok_or_else(|| StreamError::exit("Audio file not found"))?;
    let language = resolve_language(&picked, desired, prompt)?;
    Ok(StreamMatch {
        picked,
        language,
        identity,
    })
}

/// Choose a subtitle track; `None` when there is nothing to choose from
pub fn select_subtitle(
    desired: Option<&str>,
    candidates: Candidates,
    replay: Option<&SelectedStream>,
    prompt: &dyn Prompt,
) -> Result<Option<StreamMatch>> {
    let Some((picked, identity)) = choose(StreamKind::Subtitle, desired, candidates, replay, prompt)? else {
        return Ok(None);
    };
    let language = resolve_language(&picked, desired, prompt)?;
    Ok(Some(StreamMatch {
        picked,
        language,
        identity,
    }))
}
