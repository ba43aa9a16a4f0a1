//! browser-stream
//!
//! Prepares local video files for browser playback (MP4 with browser-compatible
//! audio, optional burned or embedded subtitles, WebVTT sidecars) and shares
//! them through an Nginx site or Plex direct links. Converted files are cached
//! next to the source and reused when they already match the request.

pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod matcher;
pub mod media;
pub mod naming;
pub mod pipeline;
pub mod process;
pub mod prompt;
pub mod stream;
