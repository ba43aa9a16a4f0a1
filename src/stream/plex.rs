use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StreamError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:32400";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Default, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<LibrarySection>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
    #[serde(rename = "Location", default)]
    pub locations: Vec<LibraryLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryLocation {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "ratingKey")]
    pub rating_key: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "Media", default)]
    pub media: Vec<MediaEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaEntry {
    #[serde(rename = "Part", default)]
    pub parts: Vec<MediaPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPart {
    pub file: String,
}

/// Library section whose location is a prefix of `path`
pub fn section_for_path<'a>(sections: &'a [LibrarySection], path: &Path) -> Result<&'a LibrarySection> {
    let path = path.to_string_lossy();
    sections
        .iter()
        .find(|section| section.locations.iter().any(|l| path.starts_with(&l.path)))
        .ok_or_else(|| {
            let available: Vec<String> = sections
                .iter()
                .flat_map(|s| s.locations.iter().map(|l| format!("- {}", l.path)))
                .collect();
            StreamError::exit(format!(
                "No library found for path: {}.\nAvailable paths:\n{}",
                path,
                available.join("\n")
            ))
        })
}

/// Rating key of the item with a media part stored at `path`
pub fn rating_key_for_file(items: &[MetadataItem], path: &Path) -> Option<String> {
    let path = path.to_string_lossy();
    items
        .iter()
        .find(|item| item.media.iter().flat_map(|m| &m.parts).any(|p| p.file == path))
        .map(|item| item.rating_key.clone())
}

/// Plex Media Server HTTP API
pub struct PlexApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    server_id: Option<String>,
}

impl PlexApi {
    pub fn new<S: Into<String>>(token: S, base_url: &str, server_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            server_id,
        }
    }

    /// From a `https://<ip>.<server_id>.plex.direct:32400/...?X-Plex-Token=<token>` link
    pub fn from_direct_url(direct_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(direct_url)
            .map_err(|e| StreamError::exit(format!("Invalid Plex direct URL: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| StreamError::exit("Plex direct URL has no host"))?;
        let server_id = host.split('.').nth(1).unwrap_or(host).to_string();
        let token = url
            .query_pairs()
            .find(|(k, _)| k == "X-Plex-Token")
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| StreamError::exit("X-Plex-Token not found in Plex direct URL"))?;
        let base_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        Ok(Self::new(token, &base_url, Some(server_id)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    pub fn direct_url(&self, path: &str) -> Result<String> {
        if self.server_id.is_none() {
            return Err(StreamError::exit("Plex Server ID is not provided"));
        }
        Ok(format!(
            "{}/{}?X-Plex-Token={}",
            self.base_url,
            path.trim_start_matches('/'),
            self.token
        ))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("Plex GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(params)
            .query(&[("X-Plex-Token", self.token.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    pub async fn libraries(&self) -> Result<Vec<LibrarySection>> {
        let envelope: Envelope<SectionsContainer> = self.get("/library/sections", &[]).await?;
        Ok(envelope.media_container.directories)
    }

    pub async fn library(&self, section_id: &str) -> Result<Vec<MetadataItem>> {
        let envelope: Envelope<MetadataContainer> =
            self.get(&format!("/library/sections/{}/all", section_id), &[]).await?;
        Ok(envelope.media_container.metadata)
    }

    pub async fn metadata(&self, id: &str) -> Result<Vec<MetadataItem>> {
        let envelope: Envelope<MetadataContainer> = self.get(&format!("/library/metadata/{}", id), &[]).await?;
        Ok(envelope.media_container.metadata)
    }

    pub async fn metadata_children(&self, id: &str) -> Result<Vec<MetadataItem>> {
        let envelope: Envelope<MetadataContainer> =
            self.get(&format!("/library/metadata/{}/children", id), &[]).await?;
        Ok(envelope.media_container.metadata)
    }

    /// Ask Plex to rescan a section, limited to `path` when given
    pub async fn refresh_section(&self, section_id: &str, path: Option<&Path>) -> Result<()> {
        let url = format!("{}/library/sections/{}/refresh", self.base_url, section_id);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("X-Plex-Token", self.token.as_str())]);
        if let Some(path) = path {
            request = request.query(&[("path", &*path.to_string_lossy())]);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }

    /// Rating key of the library item playing `path`.
    ///
    /// Shows are searched through their seasons down to episodes.
    pub async fn library_id_by_path(&self, path: &Path) -> Result<String> {
        let sections = self.libraries().await?;
        let section = section_for_path(&sections, path)?;
        let items = self.library(&section.key).await?;
        if let Some(key) = rating_key_for_file(&items, path) {
            return Ok(key);
        }

        for show in items.iter().filter(|i| i.media.is_empty()) {
            for season in self.metadata_children(&show.rating_key).await? {
                let episodes = self.metadata_children(&season.rating_key).await?;
                if let Some(key) = rating_key_for_file(&episodes, path) {
                    return Ok(key);
                }
            }
        }
        Err(StreamError::exit(format!(
            "No media found for path: {}, directory key: {}",
            path.display(),
            section.key
        )))
    }

    pub async fn stream_url(&self, path: &Path) -> Result<String> {
        let key = self.library_id_by_path(path).await?;
        self.direct_url(&format!("/library/metadata/{}/media/0/file.mkv", key))
    }

    /// Refresh the section holding a freshly written file and wait until Plex knows it
    pub async fn wait_for_media(&self, path: &Path, attempts: u32, interval: Duration) -> Result<String> {
        let sections = self.libraries().await?;
        let section = section_for_path(&sections, path)?;
        info!("Refreshing Plex library: {}", section.title);
        self.refresh_section(&section.key, path.parent()).await?;

        let mut last_error = None;
        for attempt in 1..=attempts {
            tokio::time::sleep(interval).await;
            match self.stream_url(path).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    debug!("Plex has not indexed {} yet (attempt {}/{})", path.display(), attempt, attempts);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| StreamError::Plex(format!("Plex did not index {}", path.display()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTIONS: &str = r#"{"MediaContainer": {"size": 2, "Directory": [
        {"key": "1", "title": "Movies", "Location": [{"id": 1, "path": "/srv/media/movies"}]},
        {"key": "2", "title": "Shows", "Location": [{"id": 2, "path": "/srv/media/shows"}]}
    ]}}"#;

    const LIBRARY: &str = r#"{"MediaContainer": {"Metadata": [
        {"ratingKey": "101", "title": "Movie", "Media": [{"Part": [{"file": "/srv/media/movies/movie.mkv"}]}]},
        {"ratingKey": "102", "title": "Movie", "Media": [{"Part": [{"file": "/srv/media/movies/movie.en.stream.mp4"}]}]}
    ]}}"#;

    #[test]
    fn test_section_for_path() {
        let envelope: Envelope<SectionsContainer> = serde_json::from_str(SECTIONS).unwrap();
        let sections = envelope.media_container.directories;

        let section = section_for_path(&sections, Path::new("/srv/media/shows/s1/e1.mkv")).unwrap();
        assert_eq!(section.title, "Shows");

        let err = section_for_path(&sections, Path::new("/home/me/movie.mkv")).unwrap_err();
        assert!(err.to_string().contains("- /srv/media/movies"));
    }

    #[test]
    fn test_rating_key_for_file() {
        let envelope: Envelope<MetadataContainer> = serde_json::from_str(LIBRARY).unwrap();
        let items = envelope.media_container.metadata;

        assert_eq!(
            rating_key_for_file(&items, Path::new("/srv/media/movies/movie.en.stream.mp4")).as_deref(),
            Some("102")
        );
        assert_eq!(rating_key_for_file(&items, Path::new("/srv/media/movies/other.mkv")), None);
    }

    #[test]
    fn test_from_direct_url() {
        let api = PlexApi::from_direct_url(
            "https://192-168-1-10.abcdef123.plex.direct:32400/library/parts/1/2/file.mkv?download=1&X-Plex-Token=tok",
        )
        .unwrap();
        assert_eq!(api.base_url(), "https://192-168-1-10.abcdef123.plex.direct:32400");
        assert_eq!(api.token(), "tok");
        assert_eq!(api.server_id(), Some("abcdef123"));
        assert_eq!(
            api.direct_url("/library/metadata/7/media/0/file.mkv").unwrap(),
            "https://192-168-1-10.abcdef123.plex.direct:32400/library/metadata/7/media/0/file.mkv?X-Plex-Token=tok"
        );
    }

    #[test]
    fn test_direct_url_requires_server_id() {
        let api = PlexApi::new("tok", "http://localhost:32400/", None);
        assert_eq!(api.base_url(), DEFAULT_BASE_URL);
        assert!(api.direct_url("library").is_err());
    }
}
