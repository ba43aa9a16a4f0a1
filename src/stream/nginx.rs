use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::fs::{FileSystem, generate_token, relative_to};
use crate::process::ensure_installed;
use crate::prompt::Prompt;

pub const SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
pub const SITES_ENABLED: &str = "/etc/nginx/sites-enabled";
pub const DEFAULT_PORT: u16 = 32000;
pub const DEFAULT_SITE_NAME: &str = "browser_stream";

/// Everything is escaped except unreserved characters and `:/?&=`
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'&')
    .remove(b'=');

pub fn url_encode(url: &str) -> String {
    utf8_percent_encode(url, URL_ENCODE_SET).to_string()
}

/// Site serving the media directory under `/media/` behind an `x-token` query argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NginxSite {
    pub media_dir: PathBuf,
    pub secret: String,
    pub port: u16,
    pub ipv4: bool,
    pub ipv6: bool,
    pub allow_index: bool,
    pub ssl: bool,
    pub server_name: Option<String>,
}

impl NginxSite {
    pub fn render(&self) -> Result<String> {
        let server_name = self.server_name.as_deref().filter(|s| !s.is_empty());
        if self.ssl && server_name.is_none() {
            return Err(StreamError::exit("Server name is required for SSL configuration"));
        }
        let ssl = if self.ssl { " ssl" } else { "" };

        let mut lines = vec!["server {".to_string()];
        if self.ipv4 {
            lines.push(format!("    listen {}{};", self.port, ssl));
        }
        if self.ipv6 {
            lines.push(format!("    listen [::]:{}{};", self.port, ssl));
        }
        lines.push(format!("    server_name {};", server_name.unwrap_or("_")));

        if let Some(name) = server_name.filter(|_| self.ssl) {
            lines.push(String::new());
            lines.push(format!("    ssl_certificate /etc/letsencrypt/live/{}/fullchain.pem;", name));
            lines.push(format!("    ssl_certificate_key /etc/letsencrypt/live/{}/privkey.pem;", name));
            lines.push("    ssl_protocols TLSv1.2 TLSv1.3;".to_string());
            lines.push("    ssl_ciphers HIGH:!aNULL:!MD5;".to_string());
            lines.push(String::new());
            lines.push("    # Redirect HTTP to HTTPS".to_string());
            lines.push("    if ($scheme != \"https\") {".to_string());
            lines.push("        return 301 https://$host$request_uri;".to_string());
            lines.push("    }".to_string());
        }

        let media_dir = self.media_dir.to_string_lossy();
        let autoindex = if self.allow_index { "on" } else { "off" };
        lines.push(format!(
            r#"
    # Block root access
    location = / {{
        return 403;
    }}

    # Serve media files
    location /media/ {{
        alias "{}/";
        autoindex {};

        # Secure with token authentication
        set $allow_access 0;
        set $secret "{}";
        if ($arg_x-token = $secret) {{
            set $allow_access 1;
        }}
        if ($allow_access = 0) {{
            return 403;
        }}

        types {{
            video/mp4 mp4;
            text/html html;
            text/vtt vtt;
        }}
        default_type application/octet-stream;
    }}
}}"#,
            media_dir.trim_end_matches('/'),
            autoindex,
            self.secret
        ));
        Ok(lines.join("\n"))
    }
}

/// Public URL of a file inside the media directory
pub fn stream_url(config: &Config, file: &Path) -> Result<String> {
    let secret = config
        .nginx_secret
        .as_deref()
        .ok_or_else(|| StreamError::exit("Nginx secret not found, run `browser-streamer setup nginx` first"))?;
    let domain = config
        .nginx_domain_name
        .as_deref()
        .ok_or_else(|| StreamError::exit("Nginx domain name not found, run `browser-streamer setup nginx --domain-name`"))?;
    let port = config
        .nginx_port
        .ok_or_else(|| StreamError::exit("Nginx port not found, run `browser-streamer setup nginx` first"))?;
    let media_dir = config
        .media_dir
        .as_deref()
        .ok_or_else(|| StreamError::exit("Media directory not found, run `browser-streamer setup nginx` first"))?;

    let relative = relative_to(file, media_dir).ok_or_else(|| {
        StreamError::exit(format!(
            "File must be in media directory: {}. Found: {}",
            media_dir.display(),
            file.display()
        ))
    })?;
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");

    Ok(url_encode(&format!(
        "https://{}:{}/media/{}?x-token={}",
        domain, port, relative, secret
    )))
}

/// Options of `setup nginx`; `None` falls back to the saved configuration
#[derive(Debug, Clone, Default)]
pub struct NginxSetupOptions {
    pub media_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub ipv4: bool,
    pub ipv6: bool,
    pub ssl: bool,
    pub domain_name: Option<String>,
    pub update_token: bool,
    pub site_conf_name: Option<String>,
    pub allow_index: Option<bool>,
    pub reset: bool,
}

/// The nginx binary, always run through sudo
pub struct Nginx<'a> {
    fs: &'a FileSystem,
}

impl<'a> Nginx<'a> {
    pub fn new(fs: &'a FileSystem) -> Self {
        Self { fs }
    }

    pub fn ensure_installed() -> Result<()> {
        ensure_installed("nginx")
    }

    pub async fn test(&self) -> Result<()> {
        info!("Testing nginx configuration");
        self.fs
            .run_sudo("nginx", &["-t".to_string()], "Nginx configuration would be tested")
            .await
    }

    pub async fn reload(&self) -> Result<()> {
        info!("Reloading nginx configuration");
        self.fs
            .run_sudo(
                "nginx",
                &["-s".to_string(), "reload".to_string()],
                "Nginx configuration would be reloaded",
            )
            .await
    }

    /// Write the site, enable it and reload nginx; the configuration is updated and saved
    pub async fn setup(
        &self,
        options: &NginxSetupOptions,
        config: &mut Config,
        config_path: &Path,
        prompt: &dyn Prompt,
    ) -> Result<()> {
        Self::ensure_installed()?;

        let site_name = options
            .site_conf_name
            .clone()
            .or_else(|| config.nginx_conf_name.clone())
            .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());
        if config.nginx_conf_name.as_deref() != Some(site_name.as_str()) {
            config.nginx_conf_name = Some(site_name.clone());
            config.save(config_path)?;
        }
        let site_available = Path::new(SITES_AVAILABLE).join(&site_name);
        let site_enabled = Path::new(SITES_ENABLED).join(&site_name);

        if options.reset {
            self.fs.remove_file(&site_available, true).await?;
            self.fs.remove_file(&site_enabled, true).await?;
            info!("Nginx configuration reset complete");
            return Ok(());
        }

        let media_dir = match options.media_dir.clone().or_else(|| config.media_dir.clone()) {
            Some(dir) => dir,
            None => PathBuf::from(prompt.prompt_text("Enter path to media directory")?),
        };
        if !media_dir.is_dir() {
            return Err(StreamError::exit(format!("Media directory not found: {}", media_dir.display())));
        }
        let media_dir = std::path::absolute(&media_dir)?;

        let (ipv4, ipv6) = if options.ipv4 || options.ipv6 {
            (options.ipv4, options.ipv6)
        } else {
            (config.ipv4, config.ipv6)
        };
        if !ipv4 && !ipv6 {
            return Err(StreamError::exit("At least one of --ipv6 or --ipv4 must be enabled"));
        }

        let secret = match &config.nginx_secret {
            Some(secret) if !options.update_token => secret.clone(),
            _ => {
                info!("Generating new X-Token");
                generate_token()
            }
        };

        let site = NginxSite {
            media_dir,
            secret,
            port: options.port.or(config.nginx_port).unwrap_or(DEFAULT_PORT),
            ipv4,
            ipv6,
            allow_index: options.allow_index.unwrap_or(config.nginx_allow_index),
            ssl: options.ssl,
            server_name: options.domain_name.clone().or_else(|| config.nginx_domain_name.clone()),
        };
        let rendered = site.render()?;

        let current = std::fs::read_to_string(&site_available).unwrap_or_default();
        if current.trim() == rendered.trim() {
            info!("Nginx configuration is up-to-date");
            return Ok(());
        }

        info!("Generating Nginx configuration");
        self.fs.write_file(&site_available, &rendered, true).await?;
        config.media_dir = Some(site.media_dir);
        config.nginx_port = Some(site.port);
        config.ipv4 = site.ipv4;
        config.ipv6 = site.ipv6;
        config.nginx_secret = Some(site.secret);
        config.nginx_allow_index = site.allow_index;
        config.nginx_domain_name = site.server_name;
        config.save(config_path)?;

        self.test().await?;
        self.reload().await?;
        if !site_enabled.exists() {
            self.fs.create_symlink(&site_enabled, &site_available, true).await?;
        }
        info!("Nginx configuration generated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> NginxSite {
        NginxSite {
            media_dir: PathBuf::from("/srv/media"),
            secret: "abc123".to_string(),
            port: 32000,
            ipv4: true,
            ipv6: true,
            allow_index: false,
            ssl: true,
            server_name: Some("media.example.com".to_string()),
        }
    }

    fn config() -> Config {
        Config {
            media_dir: Some(PathBuf::from("/srv/media")),
            nginx_port: Some(32000),
            nginx_secret: Some("abc123".to_string()),
            nginx_domain_name: Some("media.example.com".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_render_ssl_site() {
        let conf = site().render().unwrap();
        assert!(conf.contains("    listen 32000 ssl;"));
        assert!(conf.contains("    listen [::]:32000 ssl;"));
        assert!(conf.contains("server_name media.example.com;"));
        assert!(conf.contains("/etc/letsencrypt/live/media.example.com/fullchain.pem"));
        assert!(conf.contains(r#"alias "/srv/media/";"#));
        assert!(conf.contains("autoindex off;"));
        assert!(conf.contains(r#"set $secret "abc123";"#));
        assert!(conf.contains("text/vtt vtt;"));
    }

    #[test]
    fn test_render_plain_site() {
        let conf = NginxSite {
            ssl: false,
            ipv6: false,
            allow_index: true,
            server_name: None,
            ..site()
        }
        .render()
        .unwrap();
        assert!(conf.contains("    listen 32000;"));
        assert!(!conf.contains("[::]"));
        assert!(conf.contains("server_name _;"));
        assert!(!conf.contains("letsencrypt"));
        assert!(conf.contains("autoindex on;"));
    }

    #[test]
    fn test_ssl_requires_server_name() {
        let err = NginxSite {
            server_name: None,
            ..site()
        }
        .render()
        .unwrap_err();
        assert_eq!(err.user_facing_code(), Some(1));
    }

    #[test]
    fn test_stream_url_is_encoded() {
        let url = stream_url(&config(), Path::new("/srv/media/Show/Episode 1.en.stream.mp4")).unwrap();
        assert_eq!(
            url,
            "https://media.example.com:32000/media/Show/Episode%201.en.stream.mp4?x-token=abc123"
        );
    }

    #[test]
    fn test_stream_url_requires_config() {
        let outside = stream_url(&config(), Path::new("/tmp/movie.mp4")).unwrap_err();
        assert!(outside.to_string().contains("must be in media directory"));

        let no_domain = Config {
            nginx_domain_name: None,
            ..config()
        };
        assert!(stream_url(&no_domain, Path::new("/srv/media/movie.mp4")).is_err());
    }
}
