// Publishing prepared media
//
// - nginx: site template, setup and token-protected URLs
// - plex: Plex Media Server API and direct links
// - html: player page for video + subtitle track

pub mod html;
pub mod nginx;
pub mod plex;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::{BatchContext, BatchCoordinator, BatchProcessingSettings, EpisodeHandler};
use crate::config::{Config, RuntimeFlags};
use crate::error::{Result, StreamError};
use crate::fs::FileSystem;
use crate::naming::extension;
use crate::pipeline::{PrepareRequest, PreparationPipeline, StreamMedia};
use plex::PlexApi;

const PLEX_POLL_ATTEMPTS: u32 = 10;
const PLEX_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    Nginx,
    Plex,
}

/// What gets printed for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamLink {
    pub file: PathBuf,
    pub url: String,
}

/// Prepares media and prints a browser link for the configured server
pub struct StreamService {
    pipeline: PreparationPipeline,
    config: Config,
    fs: Arc<FileSystem>,
    target: StreamTarget,
    do_not_convert: bool,
    plex: Option<PlexApi>,
}

impl StreamService {
    /// Fails early when the target server was never set up
    pub fn new(
        pipeline: PreparationPipeline,
        config: Config,
        fs: Arc<FileSystem>,
        target: StreamTarget,
        do_not_convert: bool,
    ) -> Result<Self> {
        let plex = match target {
            StreamTarget::Nginx => {
                if config.nginx_secret.is_none() {
                    return Err(StreamError::exit(
                        "Nginx configuration not found, run `browser-streamer setup nginx` first",
                    ));
                }
                if config.media_dir.is_none() {
                    return Err(StreamError::exit(
                        "Media directory not found, run `browser-streamer setup nginx` first",
                    ));
                }
                None
            }
            StreamTarget::Plex => {
                let token = config
                    .plex_x_token
                    .clone()
                    .ok_or_else(|| StreamError::exit("Plex X-Token not found, run `browser-streamer setup plex` first"))?;
                let host = config
                    .host_url
                    .clone()
                    .ok_or_else(|| StreamError::exit("Plex host URL not found, run `browser-streamer setup plex` first"))?;
                if config.plex_server_id.is_none() {
                    return Err(StreamError::exit(
                        "Plex server ID not found, run `browser-streamer setup plex --direct-url` first",
                    ));
                }
                Some(PlexApi::new(token, &host, config.plex_server_id.clone()))
            }
        };
        Ok(Self {
            pipeline,
            config,
            fs,
            target,
            do_not_convert,
            plex,
        })
    }

    /// Stream one file, or every episode when `request.media` is a TV show directory
    pub async fn stream(&self, request: &PrepareRequest) -> Result<()> {
        let request = self.adjust_request(request);
        self.check_media(&request.media)?;

        if request.media.is_dir() && !self.do_not_convert {
            let handler = EpisodeStreamer {
                service: self,
                request: &request,
            };
            let settings = BatchProcessingSettings::new(request.burn_subtitles, request.add_subtitles_to_mp4);
            let mut coordinator = BatchCoordinator::new(self.pipeline.prompt());
            if let Some(report) = coordinator.run(&request.media, settings, &handler).await? {
                for (episode, error) in &report.failed {
                    warn!("Episode failed: {}: {}", episode.display(), error);
                }
                return Ok(());
            }
        }

        self.stream_one(&request, None).await?;
        Ok(())
    }

    /// Plex plays subtitles from the container, so unburned ones are embedded
    fn adjust_request(&self, request: &PrepareRequest) -> PrepareRequest {
        let mut request = request.clone();
        if self.target == StreamTarget::Plex && !request.burn_subtitles {
            request.add_subtitles_to_mp4 = true;
        }
        request
    }

    fn check_media(&self, media: &Path) -> Result<()> {
        if extension(media) == "html" {
            return Err(StreamError::exit("HTML can't be used directly, use video file"));
        }
        if self.target == StreamTarget::Nginx {
            let media_dir = self.config.media_dir.as_deref().unwrap_or(Path::new("/"));
            let absolute = std::path::absolute(media)?;
            if !absolute.starts_with(media_dir) {
                return Err(StreamError::exit(format!(
                    "Media file must be in media directory: {}. Found: {}",
                    media_dir.display(),
                    absolute.display()
                )));
            }
            if self.config.nginx_allow_index {
                warn!(
                    "Directory listing is enabled in Nginx configuration (allow_index=true). \
                     Anyone can navigate through your media files"
                );
            }
        }
        Ok(())
    }

    async fn stream_one(&self, request: &PrepareRequest, context: Option<&mut BatchContext>) -> Result<StreamLink> {
        let media = if self.do_not_convert {
            let path = self.pipeline.select_video(&request.media)?;
            StreamMedia {
                source: path.clone(),
                path,
                subtitles_burned: request.burn_subtitles,
                subtitle_path: request.subtitle_file.clone(),
                subtitle_lang: request.subtitle_lang.clone(),
            }
        } else {
            self.pipeline.prepare(request, context).await?
        };
        info!("Preparation done");

        let link = match self.target {
            StreamTarget::Nginx => self.publish_nginx(&media).await?,
            StreamTarget::Plex => self.publish_plex(&media).await?,
        };
        print_link(&link, self.target)?;
        Ok(link)
    }

    async fn publish_nginx(&self, media: &StreamMedia) -> Result<StreamLink> {
        let video_url = nginx::stream_url(&self.config, &media.path)?;
        let (Some(subtitle), false) = (&media.subtitle_path, media.subtitles_burned) else {
            return Ok(StreamLink {
                file: media.path.clone(),
                url: video_url,
            });
        };

        let page = media.path.with_extension("html");
        info!("Create HTML file with video and subtitles: {}", page.display());
        let html = html::video_page(
            &video_url,
            &nginx::stream_url(&self.config, subtitle)?,
            media.subtitle_lang.as_deref().unwrap_or("Unknown"),
        );
        self.fs.write_file(&page, &html, false).await?;
        Ok(StreamLink {
            url: nginx::stream_url(&self.config, &page)?,
            file: page,
        })
    }

    async fn publish_plex(&self, media: &StreamMedia) -> Result<StreamLink> {
        let plex = self
            .plex
            .as_ref()
            .ok_or_else(|| StreamError::Config("Plex client is not configured".to_string()))?;
        let url = if media.path != media.source {
            plex.wait_for_media(&media.path, PLEX_POLL_ATTEMPTS, PLEX_POLL_INTERVAL)
                .await?
        } else {
            plex.stream_url(&media.path).await?
        };
        Ok(StreamLink {
            file: media.path.clone(),
            url: nginx::url_encode(&url),
        })
    }
}

fn print_link(link: &StreamLink, target: StreamTarget) -> Result<()> {
    if RuntimeFlags::current().json_output {
        println!("{}", serde_json::to_string(link)?);
        return Ok(());
    }
    let server = match target {
        StreamTarget::Nginx => "Nginx server",
        StreamTarget::Plex => "Plex",
    };
    println!("Stream media file using {}", server);
    println!("File: '{}'", link.file.display());
    println!("URL: {}", link.url);
    if target == StreamTarget::Nginx {
        println!("\nDo not forget to update token with `browser-streamer setup nginx --update-token` (after streaming media file)");
    }
    Ok(())
}

/// Streams each batch episode with the same request options
struct EpisodeStreamer<'a> {
    service: &'a StreamService,
    request: &'a PrepareRequest,
}

#[async_trait]
impl EpisodeHandler for EpisodeStreamer<'_> {
    async fn handle(&self, episode: &Path, context: &mut BatchContext) -> Result<()> {
        let request = self.request.for_media(episode);
        self.service.stream_one(&request, Some(context)).await?;
        Ok(())
    }
}
