//! In-memory filesystem for store tests: scripted mount state, trash
//! support, and per-path failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::fs::local::looks_like_text;
use crate::fs::{
    CancelToken, DirStream, EntryKind, FileInfo, FileSystem, Probe, TrashError, WatchEvent,
    WatchGuard, WatchKind,
};

#[derive(Debug, Clone)]
struct MockEntry {
    kind: EntryKind,
    text: bool,
}

#[derive(Debug, Default)]
struct MockState {
    entries: BTreeMap<PathBuf, MockEntry>,
    mounted: bool,
    mount_succeeds: bool,
    trash_supported: bool,
    trashed: Vec<PathBuf>,
    fail_enumerate: HashSet<PathBuf>,
    fail_enumerate_after: HashMap<PathBuf, usize>,
    fail_delete: HashSet<PathBuf>,
    watchers: Vec<mpsc::UnboundedSender<WatchEvent>>,
}

/// Scriptable in-memory filesystem.
#[derive(Debug)]
pub(crate) struct MockFs {
    state: Mutex<MockState>,
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn info_for(path: &Path, entry: &MockEntry) -> FileInfo {
    let name = name_of(path);
    let hidden = name.starts_with('.');
    FileInfo {
        name,
        kind: entry.kind,
        hidden,
        text: entry.text,
    }
}

impl MockFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                mounted: true,
                mount_succeeds: true,
                trash_supported: true,
                ..MockState::default()
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.lock().mounted = mounted;
    }

    pub fn set_mount_succeeds(&self, ok: bool) {
        self.lock().mount_succeeds = ok;
    }

    pub fn set_trash_supported(&self, ok: bool) {
        self.lock().trash_supported = ok;
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.lock().entries.insert(
            path.into(),
            MockEntry {
                kind: EntryKind::Directory,
                text: false,
            },
        );
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let text = looks_like_text(&name_of(&path));
        self.lock()
            .entries
            .insert(path, MockEntry {
                kind: EntryKind::File,
                text,
            });
    }

    pub fn add_special(&self, path: impl Into<PathBuf>) {
        self.lock().entries.insert(
            path.into(),
            MockEntry {
                kind: EntryKind::Special,
                text: false,
            },
        );
    }

    pub fn fail_enumerate(&self, path: impl Into<PathBuf>) {
        self.lock().fail_enumerate.insert(path.into());
    }

    /// Fail the enumeration of `path` after `count` entries were streamed.
    pub fn fail_enumerate_after(&self, path: impl Into<PathBuf>, count: usize) {
        self.lock().fail_enumerate_after.insert(path.into(), count);
    }

    pub fn fail_delete(&self, path: impl Into<PathBuf>) {
        self.lock().fail_delete.insert(path.into());
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    pub fn trashed(&self) -> Vec<PathBuf> {
        self.lock().trashed.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Push a watch event to every registered watcher, as the platform
    /// monitor would.
    pub fn emit_watch(&self, dir: impl Into<PathBuf>, path: impl Into<PathBuf>, kind: WatchKind) {
        let event = WatchEvent {
            dir: dir.into(),
            path: path.into(),
            kind,
        };
        for tx in &self.lock().watchers {
            let _ = tx.send(event.clone());
        }
    }

    fn remove_tree(state: &mut MockState, path: &Path) -> bool {
        let existed = state.entries.remove(path).is_some();
        let descendants: Vec<PathBuf> = state
            .entries
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in descendants {
            state.entries.remove(&p);
        }
        existed
    }
}

#[derive(Debug)]
struct MockWatchGuard;

impl WatchGuard for MockWatchGuard {}

struct MockDirStream {
    entries: Vec<FileInfo>,
    pos: usize,
    fail_after: Option<usize>,
}

#[async_trait]
impl DirStream for MockDirStream {
    async fn next_batch(&mut self, max: usize) -> io::Result<Vec<FileInfo>> {
        if let Some(limit) = self.fail_after {
            if self.pos >= limit {
                return Err(io::Error::new(io::ErrorKind::Other, "scripted mid-stream"));
            }
        }
        let end = (self.pos + max).min(self.entries.len());
        let batch = self.entries[self.pos..end].to_vec();
        self.pos = end;
        Ok(batch)
    }
}

#[async_trait]
impl FileSystem for MockFs {
    fn query_info(&self, path: &Path) -> Probe {
        let state = self.lock();
        if !state.mounted {
            return Probe::NotMounted;
        }
        match state.entries.get(path) {
            Some(entry) => Probe::Found(info_for(path, entry)),
            None => Probe::NotFound,
        }
    }

    async fn enumerate(&self, dir: &Path) -> io::Result<Box<dyn DirStream>> {
        let state = self.lock();
        if state.fail_enumerate.contains(dir) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "scripted"));
        }
        if !state.entries.contains_key(dir) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        let entries: Vec<FileInfo> = state
            .entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir))
            .map(|(p, e)| info_for(p, e))
            .collect();
        let fail_after = state.fail_enumerate_after.get(dir).copied();
        Ok(Box::new(MockDirStream {
            entries,
            pos: 0,
            fail_after,
        }))
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if state.entries.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        let text = looks_like_text(&name_of(path));
        state.entries.insert(
            path.to_path_buf(),
            MockEntry {
                kind: EntryKind::File,
                text,
            },
        );
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if state.entries.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        state.entries.insert(
            path.to_path_buf(),
            MockEntry {
                kind: EntryKind::Directory,
                text: false,
            },
        );
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.lock();
        let moved: Vec<(PathBuf, MockEntry)> = state
            .entries
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        if moved.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such entry"));
        }
        for (p, entry) in moved {
            state.entries.remove(&p);
            let suffix = p.strip_prefix(from).expect("prefix checked");
            state.entries.insert(to.join(suffix), entry);
        }
        Ok(())
    }

    async fn trash(&self, path: &Path, _cancel: &CancelToken) -> Result<(), TrashError> {
        let mut state = self.lock();
        if !state.trash_supported {
            return Err(TrashError::Unsupported);
        }
        if !Self::remove_tree(&mut state, path) {
            return Err(TrashError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no such entry",
            )));
        }
        state.trashed.push(path.to_path_buf());
        Ok(())
    }

    async fn delete(&self, path: &Path, _cancel: &CancelToken) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_delete.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "scripted"));
        }
        if !Self::remove_tree(&mut state, path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such entry"));
        }
        Ok(())
    }

    async fn mount(&self, path: &Path, _cancel: &CancelToken) -> io::Result<()> {
        let mut state = self.lock();
        if state.mount_succeeds {
            state.mounted = true;
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("cannot mount {}", path.display()),
            ))
        }
    }

    fn watch(
        &self,
        _dir: &Path,
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> io::Result<Box<dyn WatchGuard>> {
        self.lock().watchers.push(tx);
        Ok(Box::new(MockWatchGuard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumerate_lists_direct_children_only() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_file("/r/a.txt");
        fs.add_dir("/r/sub");
        fs.add_file("/r/sub/deep.txt");

        let mut stream = fs.enumerate(Path::new("/r")).await.unwrap();
        let batch = stream.next_batch(10).await.unwrap();
        let names: Vec<&str> = batch.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert!(stream.next_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_moves_descendants() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.add_dir("/r/sub");
        fs.add_file("/r/sub/notes.txt");

        fs.rename(Path::new("/r/sub"), Path::new("/r/subdir")).unwrap();
        assert!(!fs.exists(Path::new("/r/sub")));
        assert!(fs.exists(Path::new("/r/subdir/notes.txt")));
    }

    #[tokio::test]
    async fn unmounted_probe_then_mount() {
        let fs = MockFs::new();
        fs.add_dir("/r");
        fs.set_mounted(false);
        assert!(matches!(fs.query_info(Path::new("/r")), Probe::NotMounted));
        fs.mount(Path::new("/r"), &CancelToken::new()).await.unwrap();
        assert!(matches!(fs.query_info(Path::new("/r")), Probe::Found(_)));
    }

    #[tokio::test]
    async fn trash_unsupported_when_scripted() {
        let fs = MockFs::new();
        fs.add_file("/r/a.txt");
        fs.set_trash_supported(false);
        let err = fs.trash(Path::new("/r/a.txt"), &CancelToken::new()).await;
        assert!(matches!(err, Err(TrashError::Unsupported)));
        assert!(fs.exists(Path::new("/r/a.txt")));
    }
}
