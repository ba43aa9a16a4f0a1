use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{Result, StreamError};

pub const CONFIG_PATH: &str = "~/.browser_stream/config.json";
pub const CONFIG_ENV: &str = "BROWSER_STREAM_CONFIG";

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "m4v", "wmv", "flv", "ts"];
pub const AUDIO_EXTENSIONS: &[&str] = &["aac", "ac3", "eac3", "dts", "mp3", "m4a", "flac", "ogg", "opus", "wav", "mka"];
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "vtt", "ass", "ssa", "sub"];
/// Subtitle formats that are plain text and may need re-encoding to UTF-8
pub const TEXT_SUBTITLE_EXTENSIONS: &[&str] = &["srt", "vtt", "ass", "ssa"];

/// Persisted server/connection configuration (flat JSON object)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media_dir: Option<PathBuf>,
    pub host_url: Option<String>,
    pub plex_port: Option<u16>,
    pub nginx_port: Option<u16>,
    pub ipv6: bool,
    pub ipv4: bool,
    pub plex_x_token: Option<String>,
    pub plex_server_id: Option<String>,
    pub nginx_secret: Option<String>,
    pub nginx_conf_name: Option<String>,
    pub nginx_allow_index: bool,
    pub nginx_domain_name: Option<String>,
}

impl Config {
    /// Load configuration; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| StreamError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Saving configuration to {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StreamError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| StreamError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Resolve the config file location: explicit path, then environment, then default
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return expand_home(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => expand_home(Path::new(&path)),
            None => expand_home(Path::new(CONFIG_PATH)),
        }
    }

    /// Directory holding the config file; logs live next to it
    pub fn state_dir(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Expand a leading `~` using `$HOME`
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Behaviour toggles read from the environment once per process
#[derive(Debug, Clone, Default)]
pub struct RuntimeFlags {
    /// Debug logging
    pub debug: bool,
    /// Print the full error chain instead of a one-line message
    pub raise_exceptions: bool,
    /// JSON console logs, no spinners
    pub json_output: bool,
    /// Ask before every external command
    pub prompt_commands: bool,
    /// Print every external command before running it
    pub print_cmd: bool,
}

impl RuntimeFlags {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let flag = |name: &str| {
            lookup(name)
                .map(|value| matches!(value.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false)
        };
        Self {
            debug: flag("DEBUG"),
            raise_exceptions: flag("RAISE_EXCEPTIONS"),
            json_output: flag("JSON_OUTPUT"),
            prompt_commands: flag("PROMPT_COMMANDS"),
            print_cmd: flag("PRINT_CMD"),
        }
    }

    pub fn current() -> &'static RuntimeFlags {
        static FLAGS: OnceLock<RuntimeFlags> = OnceLock::new();
        FLAGS.get_or_init(Self::from_env)
    }
}

/// Media tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Audio codec every browser can play
    pub browser_audio_codec: String,
    pub browser_audio_bitrate: String,
    /// Quality used when subtitles force a video re-encode
    pub encode_crf: String,
    pub encode_preset: String,
    /// Upper bound on external audio candidates offered next to a video
    pub max_external_audio: usize,
    /// Upper bound on external subtitle candidates offered next to a video
    pub max_external_subtitles: usize,
    /// Directory depth searched for external audio/subtitle files
    pub search_depth: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            browser_audio_codec: "aac".to_string(),
            browser_audio_bitrate: "192k".to_string(),
            encode_crf: "23".to_string(),
            encode_preset: "veryfast".to_string(),
            max_external_audio: 10,
            max_external_subtitles: 20,
            search_depth: 2,
        }
    }
}
