use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{AUDIO_EXTENSIONS, SUBTITLE_EXTENSIONS, TEXT_SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::error::{Result, StreamError};
use crate::naming::extension;
use crate::process::ProcessCommand;
use crate::prompt::Prompt;

/// Files with one of `extensions` under `directory`, `depth` levels of subdirectories deep.
/// Files of a directory come before those of its subdirectories; each level is sorted by name.
pub fn files_with_extensions(directory: &Path, extensions: &[&str], depth: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(depth + 1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| extensions.contains(&extension(p).as_str()))
        .collect();
    files.sort_by(|a, b| {
        let depth_a = a.components().count();
        let depth_b = b.components().count();
        depth_a.cmp(&depth_b).then_with(|| a.cmp(b))
    });
    files
}

pub fn video_files(directory: &Path, depth: usize) -> Vec<PathBuf> {
    files_with_extensions(directory, VIDEO_EXTENSIONS, depth)
}

pub fn audio_files(directory: &Path, depth: usize) -> Vec<PathBuf> {
    files_with_extensions(directory, AUDIO_EXTENSIONS, depth)
}

pub fn subtitle_files(directory: &Path, depth: usize) -> Vec<PathBuf> {
    files_with_extensions(directory, SUBTITLE_EXTENSIONS, depth)
}

pub fn is_video_file(path: &Path) -> bool {
    VIDEO_EXTENSIONS.contains(&extension(path).as_str())
}

/// Keep files whose name starts like the media stem (falling back to all of them), at most `cap`
pub fn related_files(media_file: &Path, files: Vec<PathBuf>, cap: usize, what: &str) -> Vec<PathBuf> {
    let media_stem = media_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let related: Vec<PathBuf> = files
        .iter()
        .filter(|f| {
            let stem = f.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let head = stem.split('.').next().unwrap_or_default();
            !head.is_empty() && media_stem.contains(head)
        })
        .cloned()
        .collect();
    let mut files = if related.is_empty() { files } else { related };

    if files.len() > cap {
        let folder = media_file
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        warn!("Found {} {} files in {}. Showing only first {}", files.len(), what, folder, cap);
        files.truncate(cap);
    }
    files
}

/// Re-encode a non-UTF-8 text subtitle as `<stem>.utf8.<ext>`; other files are returned unchanged
pub fn enforce_utf8(path: &Path) -> Result<PathBuf> {
    if !TEXT_SUBTITLE_EXTENSIONS.contains(&extension(path).as_str()) {
        return Ok(path.to_path_buf());
    }
    let bytes = std::fs::read(path)?;
    if std::str::from_utf8(&bytes).is_ok() {
        return Ok(path.to_path_buf());
    }

    let encoding = detect_encoding(&bytes);
    let (content, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return Err(StreamError::exit(format!(
            "Could not detect encoding for {} (best guess: {})",
            path.display(),
            encoding.name()
        )));
    }

    let output = path.with_extension(format!("utf8.{}", extension(path)));
    info!(
        "Converting file {} encoding from {} to UTF-8: {}",
        path.display(),
        encoding.name(),
        output.display()
    );
    std::fs::write(&output, content.as_ref())?;
    Ok(output)
}

/// Encoding announced by a BOM, otherwise guessed from the content
fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, false)
}

/// Path of `path` relative to `base`, or `None` when it is outside of it
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if !path.starts_with(base) {
        return None;
    }
    pathdiff::diff_paths(path, base)
}

/// 32 random hex characters
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// File operations that may need root; privileged ones go through `sudo -S`
pub struct FileSystem {
    prompt: Arc<dyn Prompt>,
    password: Mutex<Option<String>>,
}

impl FileSystem {
    pub fn new(prompt: Arc<dyn Prompt>) -> Self {
        Self {
            prompt,
            password: Mutex::new(None),
        }
    }

    fn sudo_password(&self, command: &str, what_happens: &str) -> Result<String> {
        if let Some(password) = self.password.lock().ok().and_then(|p| p.clone()) {
            return Ok(password);
        }
        warn!("This command requires sudo access");
        info!("Command: {}", command);
        info!("What happens: {}", what_happens);
        let password = self.prompt.prompt_secret("Enter your sudo password")?;
        if let Ok(mut cached) = self.password.lock() {
            *cached = Some(password.clone());
        }
        Ok(password)
    }

    /// Run `program` as root, asking for the sudo password once per process
    pub async fn run_sudo(&self, program: &str, args: &[String], what_happens: &str) -> Result<()> {
        let preview = format!("sudo -S {} {}", program, args.join(" "));
        let password = self.sudo_password(&preview, what_happens)?;
        ProcessCommand::sudo(program, what_happens, password)
            .args(args.iter().cloned())
            .execute()
            .await?;
        Ok(())
    }

    pub async fn create_dir(&self, path: &Path, sudo: bool) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        info!("Creating directory: {}", path.display());
        if sudo {
            let args = vec!["-p".to_string(), path.display().to_string()];
            return self.run_sudo("mkdir", &args, "Directory would be created").await;
        }
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    pub async fn write_file(&self, path: &Path, content: &str, sudo: bool) -> Result<()> {
        info!("Creating file: {}", path.display());
        let content = format!("{}\n", content);
        if sudo {
            let temp = tempfile::NamedTempFile::new()?;
            std::fs::write(temp.path(), content)?;
            let (_, temp_path) = temp.keep().map_err(|e| StreamError::Io(e.error))?;
            let args = vec![temp_path.display().to_string(), path.display().to_string()];
            return self.run_sudo("mv", &args, "File would be created").await;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn create_symlink(&self, link: &Path, target: &Path, sudo: bool) -> Result<()> {
        if link.exists() && !link.is_symlink() {
            return Err(StreamError::exit(format!(
                "Symlink path already exists as a regular file: {}",
                link.display()
            )));
        }
        if !target.exists() {
            return Err(StreamError::exit(format!("Target path does not exist: {}", target.display())));
        }
        info!("Creating symlink: {} -> {}", link.display(), target.display());
        if sudo {
            let args = vec![
                "-sf".to_string(),
                target.display().to_string(),
                link.display().to_string(),
            ];
            return self.run_sudo("ln", &args, "Symlink would be created").await;
        }
        #[cfg(unix)]
        tokio::fs::symlink(target, link).await?;
        #[cfg(not(unix))]
        return Err(StreamError::UnsupportedFormat("symlinks require a unix platform".to_string()));
        #[cfg(unix)]
        Ok(())
    }

    pub async fn remove_file(&self, path: &Path, sudo: bool) -> Result<()> {
        if !path.exists() && !path.is_symlink() {
            return Ok(());
        }
        info!("Removing file: {}", path.display());
        if sudo {
            let args = vec![path.display().to_string()];
            return self.run_sudo("rm", &args, "File would be removed").await;
        }
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    pub async fn remove_symlink(&self, path: &Path, sudo: bool) -> Result<()> {
        if !path.is_symlink() {
            if path.exists() {
                return Err(StreamError::exit(format!("Path is not a symlink: {}", path.display())));
            }
            return Ok(());
        }
        self.remove_file(path, sudo).await
    }
}
