//! browser-streamer: prepare local media for browser playback and print
//! a link served by Nginx or Plex.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, error, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use browser_stream::batch::{confirm_repack, run_repack};
use browser_stream::cli::{Args, Commands, MediaCommands, SetupCommands};
use browser_stream::config::{Config, MediaSettings, RuntimeFlags};
use browser_stream::error::{StreamError, UNEXPECTED_EXIT_CODE};
use browser_stream::fs::{FileSystem, video_files};
use browser_stream::media::MediaToolsFactory;
use browser_stream::naming::{REPACK_SUFFIX, STREAM_SUFFIX, has_marker};
use browser_stream::pipeline::{PrepareRequest, PreparationPipeline};
use browser_stream::prompt::{Prompt, TerminalPrompt};
use browser_stream::stream::nginx::{Nginx, NginxSetupOptions};
use browser_stream::stream::plex::{DEFAULT_BASE_URL, PlexApi};
use browser_stream::stream::{StreamService, StreamTarget};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = Config::resolve_path(args.config.as_deref());

    if let Err(e) = setup_logging(args.verbose, &config_path) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(err) = run(args, &config_path).await {
        std::process::exit(report_error(&err));
    }
}

async fn run(args: Args, config_path: &Path) -> Result<()> {
    let mut config = Config::load(config_path)?;
    let prompt: Arc<dyn Prompt> = Arc::new(TerminalPrompt::new());
    let settings = MediaSettings::default();

    match args.command {
        Commands::Stream {
            media,
            audio_lang,
            audio_file,
            subtitle_lang,
            subtitle_file,
            burn_subtitles,
            add_subtitles_to_mp4,
            do_not_convert,
            target,
        } => {
            let target = if target.with_plex {
                StreamTarget::Plex
            } else {
                StreamTarget::Nginx
            };
            let request = PrepareRequest {
                media,
                audio_file,
                audio_lang,
                subtitle_file,
                subtitle_lang,
                burn_subtitles,
                add_subtitles_to_mp4,
            };
            info!("Streaming {} ({:?})", request.media.display(), target);

            let pipeline = PreparationPipeline::new(
                MediaToolsFactory::create_prober(settings.clone()),
                MediaToolsFactory::create_transcoder(settings.clone())?,
                prompt.clone(),
                settings,
            );
            let fs = Arc::new(FileSystem::new(prompt.clone()));
            let service = StreamService::new(pipeline, config, fs, target, do_not_convert)?;
            service.stream(&request).await?;
        }
        Commands::Config { reset } => {
            if reset {
                if config_path.exists() {
                    std::fs::remove_file(config_path)?;
                }
                info!("Configuration reset: {}", config_path.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        Commands::Setup { server } => match server {
            SetupCommands::Nginx {
                media_dir,
                port,
                ipv4,
                ipv6,
                no_ssl,
                domain_name,
                update_token,
                site_conf_name,
                allow_index,
                reset,
            } => {
                let options = NginxSetupOptions {
                    media_dir,
                    port,
                    ipv4,
                    ipv6,
                    ssl: !no_ssl,
                    domain_name,
                    update_token,
                    site_conf_name,
                    allow_index: allow_index.then_some(true),
                    reset,
                };
                let fs = FileSystem::new(prompt.clone());
                Nginx::new(&fs)
                    .setup(&options, &mut config, config_path, prompt.as_ref())
                    .await?;
            }
            SetupCommands::Plex {
                direct_url,
                x_token,
                base_url,
                server_id,
            } => {
                let api = match (direct_url, x_token) {
                    (Some(url), _) => PlexApi::from_direct_url(&url)?,
                    (None, Some(token)) => {
                        PlexApi::new(token, base_url.as_deref().unwrap_or(DEFAULT_BASE_URL), server_id)
                    }
                    (None, None) => return Err(StreamError::exit("Provide --direct-url or --x-token").into()),
                };
                config.plex_x_token = Some(api.token().to_string());
                config.host_url = Some(api.base_url().to_string());
                config.plex_server_id = api.server_id().map(str::to_string);
                config.save(config_path)?;
                info!("Plex configuration saved: {}", config_path.display());
            }
        },
        Commands::Media { action } => match action {
            MediaCommands::Info { file } => {
                let prober = MediaToolsFactory::create_prober(settings);
                let info = prober.probe(&file).await?;
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            MediaCommands::Repack { dir } => {
                let prober = MediaToolsFactory::create_prober(settings.clone());
                let transcoder = MediaToolsFactory::create_transcoder(settings)?;
                let files = repack_candidates(&dir);
                if files.is_empty() {
                    return Err(StreamError::exit(format!("No video files found in {}", dir.display())).into());
                }
                let groups = confirm_repack(prober.as_ref(), prompt.as_ref(), &files).await?;
                let outputs = run_repack(prober.as_ref(), transcoder.as_ref(), &groups).await?;
                for output in outputs {
                    println!("{}", output.display());
                }
            }
        },
    }

    debug!("Done");
    Ok(())
}

/// Videos directly inside `dir`, skipping our own outputs
fn repack_candidates(dir: &Path) -> Vec<PathBuf> {
    video_files(dir, 0)
        .into_iter()
        .filter(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            !has_marker(&name, STREAM_SUFFIX) && !has_marker(&name, REPACK_SUFFIX)
        })
        .collect()
}

/// Print the error and pick the exit code.
///
/// Deliberate stops print their message only; anything else is reported with
/// its type and exits with the "unexpected" code.
fn report_error(err: &anyhow::Error) -> i32 {
    let flags = RuntimeFlags::current();
    if flags.raise_exceptions {
        eprintln!("{:?}", err);
    }

    let stream_error = err.downcast_ref::<StreamError>();
    if let Some(code) = stream_error.and_then(StreamError::user_facing_code) {
        if std::io::stderr().is_terminal() {
            eprintln!("\x1b[31mError:\x1b[0m {}", err);
        } else {
            eprintln!("Error: {}", err);
        }
        return code;
    }

    let kind = stream_error.map(StreamError::kind_name).unwrap_or("Error");
    error!("{}: {}", kind, err);
    if !flags.raise_exceptions {
        eprintln!("{}: {}", kind, err);
        eprintln!("Set RAISE_EXCEPTIONS=true to see the full error chain");
    }
    UNEXPECTED_EXIT_CODE
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, config_path: &Path) -> Result<()> {
    let flags = RuntimeFlags::current();
    let log_dir = Config::state_dir(config_path).join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "browser_stream.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose || flags.debug { Level::DEBUG } else { Level::INFO };

    let console_layer = if flags.json_output {
        fmt::layer().json().with_writer(std::io::stderr).with_target(false).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .boxed()
    };

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    debug!("Logging initialized - console: {}, file: {}", log_level, log_dir.display());
    Ok(())
}
