//! Local filesystem implementation backed by std/tokio fs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::fs::watcher::DirWatcher;
use crate::fs::{
    CancelToken, DirStream, EntryKind, FileInfo, FileSystem, Probe, TrashError, WatchEvent,
    WatchGuard,
};

/// File extensions treated as text for the hide-binary filter.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rst", "rs", "toml", "json", "yaml", "yml", "xml", "html", "htm", "css", "js",
    "ts", "py", "sh", "c", "h", "cpp", "hpp", "java", "go", "rb", "ini", "cfg", "conf", "log",
    "csv", "tex", "lock", "diff", "patch",
];

/// Whether a filename looks like a text file. A name-based heuristic: the
/// native filesystem has no content-type attribute to consult.
pub fn looks_like_text(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

fn info_for(name: String, kind: EntryKind) -> FileInfo {
    let hidden = name.starts_with('.');
    let text = kind == EntryKind::File && looks_like_text(&name);
    FileInfo {
        name,
        kind,
        hidden,
        text,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Classify a file type, following symlinks to their target. Broken
/// symlinks report as files so they still show up and can be deleted.
fn classify(path: &Path, file_type: fs::FileType) -> EntryKind {
    let resolved = if file_type.is_symlink() {
        match fs::metadata(path) {
            Ok(meta) => meta.file_type(),
            Err(_) => return EntryKind::File,
        }
    } else {
        file_type
    };
    if resolved.is_dir() {
        EntryKind::Directory
    } else if resolved.is_file() {
        EntryKind::File
    } else {
        EntryKind::Special
    }
}

/// The native local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFs {
    watch_debounce: Duration,
}

impl LocalFs {
    pub fn new() -> Self {
        Self {
            watch_debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn with_watch_debounce(debounce: Duration) -> Self {
        Self {
            watch_debounce: debounce,
        }
    }

    /// Pick a non-colliding destination inside the trash directory.
    fn trash_destination(trash_files: &Path, name: &std::ffi::OsStr) -> PathBuf {
        let mut dest = trash_files.join(name);
        let mut i = 1;
        while dest.exists() {
            let mut numbered = name.to_os_string();
            numbered.push(format!(".{}", i));
            dest = trash_files.join(numbered);
            i += 1;
        }
        dest
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

struct LocalDirStream {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl DirStream for LocalDirStream {
    async fn next_batch(&mut self, max: usize) -> io::Result<Vec<FileInfo>> {
        let mut batch = Vec::with_capacity(max.min(64));
        while batch.len() < max {
            let entry = match self.inner.next_entry().await? {
                Some(e) => e,
                None => break,
            };
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let kind = classify(&entry.path(), file_type);
            let name = entry.file_name().to_string_lossy().into_owned();
            batch.push(info_for(name, kind));
        }
        Ok(batch)
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    fn query_info(&self, path: &Path) -> Probe {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                let kind = classify(path, meta.file_type());
                Probe::Found(info_for(display_name(path), kind))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Probe::NotFound,
            Err(e) => Probe::Error(e),
        }
    }

    async fn enumerate(&self, dir: &Path) -> io::Result<Box<dyn DirStream>> {
        let inner = tokio::fs::read_dir(dir).await?;
        Ok(Box::new(LocalDirStream { inner }))
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    async fn trash(&self, path: &Path, _cancel: &CancelToken) -> Result<(), TrashError> {
        // Best-effort move into the user trash directory. A rename across
        // devices cannot work, which is exactly the "trash unsupported"
        // condition the caller falls back from.
        let trash_files = dirs::data_local_dir()
            .map(|d| d.join("Trash").join("files"))
            .ok_or(TrashError::Unsupported)?;
        tokio::fs::create_dir_all(&trash_files)
            .await
            .map_err(|_| TrashError::Unsupported)?;
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no filename"))
            .map_err(TrashError::Io)?;
        let dest = Self::trash_destination(&trash_files, name);
        match tokio::fs::rename(path, &dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TrashError::Io(e)),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(TrashError::Io(e)),
            // Cross-device and other rename failures: no usable trash here.
            Err(_) => Err(TrashError::Unsupported),
        }
    }

    async fn delete(&self, path: &Path, _cancel: &CancelToken) -> io::Result<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }

    async fn mount(&self, path: &Path, _cancel: &CancelToken) -> io::Result<()> {
        // Local paths never probe NotMounted, so this is unreachable in
        // practice; report it honestly if called anyway.
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot mount {}", path.display()),
        ))
    }

    fn watch(
        &self,
        dir: &Path,
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> io::Result<Box<dyn WatchGuard>> {
        let watcher = DirWatcher::new(dir, self.watch_debounce, tx)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(watcher))
    }
}
