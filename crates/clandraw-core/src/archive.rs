// Screenshot archive: a flat directory of winner screenshots.
//
// The archive is the only writer of its directory. Stored files are named
// `winner-<unix-millis><ext>`; listing orders by modification time, newest
// first.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, Grant, Operation};

/// Extensions shown in the gallery (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

const NAME_PREFIX: &str = "winner-";
const MAX_EXTENSION_LEN: usize = 10;
/// Upper bound on `-<n>` suffixes tried when names collide.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("only image files are allowed (got `{mime}`)")]
    NotAnImage { mime: String },

    #[error("file is {size} bytes, the limit is {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("path `{0}` is outside the screenshot archive")]
    ForbiddenPath(String),

    #[error("screenshot `{0}` not found")]
    NotFound(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl ArchiveError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotArchive {
    root: PathBuf,
    max_bytes: u64,
}

impl ScreenshotArchive {
    /// Create an archive rooted at `dir`. Relative paths are resolved against
    /// the current working directory. The directory itself is created lazily.
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self, ArchiveError> {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| ArchiveError::io("failed to resolve working directory", e))?
                .join(dir)
        };
        Ok(ScreenshotArchive {
            root: normalize(&absolute),
            max_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate and persist an uploaded screenshot. Returns the generated
    /// file name.
    pub async fn store(
        &self,
        grant: &Grant,
        bytes: &[u8],
        mime: &str,
        original_name: &str,
    ) -> Result<String, ArchiveError> {
        grant.ensure(Operation::StoreScreenshot)?;
        check_image_mime(mime)?;
        self.check_size(bytes.len() as u64)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ArchiveError::io("failed to create screenshot directory", e))?;

        let ext = extension_of(original_name);
        let stamp = Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => format!("{NAME_PREFIX}{stamp}{ext}"),
                n => format!("{NAME_PREFIX}{stamp}-{n}{ext}"),
            };
            let path = self.root.join(&name);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ArchiveError::io(format!("failed to create {name}"), e)),
            };

            if let Err(e) = write_all(&mut file, bytes).await {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(ArchiveError::io(format!("failed to write {name}"), e));
            }

            info!("Stored screenshot {} ({} bytes)", name, bytes.len());
            return Ok(name);
        }

        Err(ArchiveError::io(
            "failed to allocate a screenshot name",
            std::io::Error::new(ErrorKind::AlreadyExists, "too many name collisions"),
        ))
    }

    /// Fail with [`ArchiveError::PayloadTooLarge`] when `size` exceeds the
    /// configured limit. Exposed so callers can reject a stream early.
    pub fn check_size(&self, size: u64) -> Result<(), ArchiveError> {
        if size > self.max_bytes {
            return Err(ArchiveError::PayloadTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Image file names in the archive, newest first.
    ///
    /// Enumeration errors are logged and degrade to an empty gallery.
    pub async fn list(&self) -> Vec<String> {
        match self.try_list().await {
            Ok(files) => files,
            Err(e) => {
                warn!("Listing screenshots in {} failed: {}", self.root.display(), e);
                Vec::new()
            }
        }
    }

    async fn try_list(&self) -> std::io::Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut files: Vec<(SystemTime, String)> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_image_name(&name) {
                continue;
            }
            // The file may vanish between read_dir and stat.
            let modified = match entry.metadata().await.and_then(|m| {
                if m.is_file() {
                    m.modified()
                } else {
                    Err(std::io::Error::new(ErrorKind::Other, "not a file"))
                }
            }) {
                Ok(t) => t,
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    continue;
                }
            };
            files.push((modified, name));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(files.into_iter().map(|(_, name)| name).collect())
    }

    /// Remove a screenshot by name.
    pub async fn delete(&self, grant: &Grant, filename: &str) -> Result<(), ArchiveError> {
        grant.ensure(Operation::DeleteScreenshot)?;
        let path = self.resolve(filename)?;

        match fs::symlink_metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(ArchiveError::io(format!("failed to delete {filename}"), e)),
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| ArchiveError::io(format!("failed to delete {filename}"), e))?;

        info!("Deleted screenshot {}", filename);
        Ok(())
    }

    /// Resolve `filename` inside the archive, rejecting anything that would
    /// land outside it. Purely lexical: no filesystem access.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, ArchiveError> {
        let candidate = normalize(&self.root.join(filename));
        if candidate.starts_with(&self.root) && candidate != self.root {
            Ok(candidate)
        } else {
            warn!("Rejected screenshot path outside archive: {:?}", filename);
            Err(ArchiveError::ForbiddenPath(filename.to_string()))
        }
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

/// Reject declared content types that are not `image/*`.
pub fn check_image_mime(mime: &str) -> Result<(), ArchiveError> {
    if mime.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(ArchiveError::NotAnImage {
            mime: mime.to_string(),
        })
    }
}

/// The extension of the original upload's base name, including the dot.
/// Anything that is not a short alphanumeric extension is dropped.
fn extension_of(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Lexically normalize a path: drop `.`, resolve `..` against earlier
/// components, and keep root/prefix components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
