use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "browser-streamer", author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prepare a video for the browser and print a link to it
    Stream {
        /// Video file, or a directory (TV show episodes are offered as a batch)
        #[arg(short, long)]
        media: PathBuf,

        /// Audio language to pick (e.g. eng, spa)
        #[arg(long)]
        audio_lang: Option<String>,

        /// External audio file
        #[arg(long)]
        audio_file: Option<PathBuf>,

        /// Subtitle language to pick
        #[arg(long)]
        subtitle_lang: Option<String>,

        /// External subtitle file
        #[arg(long)]
        subtitle_file: Option<PathBuf>,

        /// Burn subtitles into the video
        #[arg(long)]
        burn_subtitles: bool,

        /// Embed subtitles as a track of the MP4
        #[arg(long)]
        add_subtitles_to_mp4: bool,

        /// Serve the file as is
        #[arg(long)]
        do_not_convert: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the configuration
    Config {
        /// Delete the configuration file
        #[arg(long)]
        reset: bool,
    },

    /// Configure a media server
    Setup {
        #[command(subcommand)]
        server: SetupCommands,
    },

    /// Media file utilities
    Media {
        #[command(subcommand)]
        action: MediaCommands,
    },
}

/// Exactly one server to stream through
#[derive(clap::Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Serve through the configured Nginx site
    #[arg(long)]
    pub with_nginx: bool,

    /// Serve through Plex direct links
    #[arg(long)]
    pub with_plex: bool,
}

#[derive(Subcommand)]
pub enum SetupCommands {
    /// Write and enable the Nginx site serving the media directory
    Nginx {
        /// Directory to serve
        #[arg(long)]
        media_dir: Option<PathBuf>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Listen on IPv4
        #[arg(long)]
        ipv4: bool,

        /// Listen on IPv6
        #[arg(long)]
        ipv6: bool,

        /// Plain HTTP, no letsencrypt certificate
        #[arg(long)]
        no_ssl: bool,

        /// Domain name of the server (required for SSL)
        #[arg(long)]
        domain_name: Option<String>,

        /// Generate a new access token
        #[arg(long)]
        update_token: bool,

        /// Site file name under /etc/nginx/sites-available
        #[arg(long)]
        site_conf_name: Option<String>,

        /// Enable directory listing
        #[arg(long)]
        allow_index: bool,

        /// Remove the site
        #[arg(long)]
        reset: bool,
    },

    /// Save Plex credentials
    Plex {
        /// Any direct link copied from Plex ("Get Info" → "View XML")
        #[arg(long, conflicts_with = "x_token", required_unless_present = "x_token")]
        direct_url: Option<String>,

        /// X-Plex-Token
        #[arg(long)]
        x_token: Option<String>,

        /// Plex server URL
        #[arg(long, requires = "x_token")]
        base_url: Option<String>,

        /// Plex server ID (needed for direct links)
        #[arg(long, requires = "x_token")]
        server_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MediaCommands {
    /// Print probed streams as JSON
    Info {
        /// Media file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Keep only selected streams of every video in a directory
    Repack {
        /// Directory with video files
        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_requires_one_target() {
        assert!(Args::try_parse_from(["browser-streamer", "stream", "-m", "movie.mkv"]).is_err());
        assert!(
            Args::try_parse_from(["browser-streamer", "stream", "-m", "m.mkv", "--with-nginx", "--with-plex"]).is_err()
        );

        let args = Args::try_parse_from(["browser-streamer", "stream", "-m", "m.mkv", "--with-plex", "--audio-lang", "spa"])
            .unwrap();
        match args.command {
            Commands::Stream { target, audio_lang, .. } => {
                assert!(target.with_plex);
                assert!(!target.with_nginx);
                assert_eq!(audio_lang.as_deref(), Some("spa"));
            }
            _ => panic!("expected stream command"),
        }
    }

    #[test]
    fn test_setup_plex_arguments() {
        assert!(Args::try_parse_from(["browser-streamer", "setup", "plex"]).is_err());
        assert!(Args::try_parse_from(["browser-streamer", "setup", "plex", "--direct-url", "u", "--x-token", "t"]).is_err());
        assert!(Args::try_parse_from(["browser-streamer", "setup", "plex", "--base-url", "http://h"]).is_err());
        assert!(Args::try_parse_from(["browser-streamer", "setup", "plex", "--x-token", "t", "--server-id", "s"]).is_ok());
    }
}
