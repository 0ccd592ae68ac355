//! In-memory filesystem backed by a `BTreeMap`.
//!
//! Provides a [`HostFs`] implementation with settable mtimes, device ids and
//! mount tables, plus injectable removal failures, so every reclaimer gate can
//! be exercised without touching a disk. All state lives behind a
//! `parking_lot::RwLock`; clones share it.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use hostpath_types::UtcTime;
use hostpath_utils::{join_path, normalize_path};

use super::{DirChild, EntryMeta, HostFs};

const MAX_SYMLINK_HOPS: usize = 40;
const ROOT_DEV: u64 = 1;

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File,
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    modified: UtcTime,
    dev: u64,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    mount_tables: HashMap<PathBuf, String>,
    /// Replacement contents and the number of reads left before they apply.
    pending_tables: HashMap<PathBuf, (usize, String)>,
    failing_removals: HashSet<PathBuf>,
    removed: Vec<PathBuf>,
}

impl State {
    fn children<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Node)> + 'a {
        self.nodes
            .range(dir.to_path_buf()..)
            .skip(1)
            .take_while(move |(p, _)| p.starts_with(dir))
            .filter(move |(p, _)| p.parent() == Some(dir))
    }

    fn dev_of_parent(&self, path: &Path) -> u64 {
        path.parent()
            .and_then(|p| self.nodes.get(p))
            .map_or(ROOT_DEV, |n| n.dev)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn key(path: &Path) -> PathBuf {
    normalize_path(&Path::new("/").join(path))
}

/// In-memory [`HostFs`].
#[derive(Clone)]
pub struct MemoryHostFs {
    state: Arc<RwLock<State>>,
}

impl MemoryHostFs {
    /// Create a filesystem containing only `/`.
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            PathBuf::from("/"),
            Node {
                kind: NodeKind::Dir,
                modified: UtcTime::default(),
                dev: ROOT_DEV,
            },
        );
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// `mkdir -p`. Newly created directories get `modified`; an existing
    /// final directory has its mtime updated.
    pub fn mkdir_all(&self, path: impl AsRef<Path>, modified: UtcTime) {
        let path = key(path.as_ref());
        let mut state = self.state.write();
        let mut current = PathBuf::from("/");
        for component in path.components().skip(1) {
            current.push(component);
            if !state.nodes.contains_key(&current) {
                let dev = state.dev_of_parent(&current);
                state.nodes.insert(
                    current.clone(),
                    Node {
                        kind: NodeKind::Dir,
                        modified,
                        dev,
                    },
                );
            }
        }
        if let Some(node) = state.nodes.get_mut(&path) {
            node.modified = modified;
        }
    }

    /// Create a regular file. The parent must exist.
    pub fn create_file(&self, path: impl AsRef<Path>) {
        self.insert_leaf(path.as_ref(), NodeKind::File);
    }

    /// Create a symlink at `path` pointing to `target`.
    pub fn symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.insert_leaf(path.as_ref(), NodeKind::Symlink(target.as_ref().to_path_buf()));
    }

    fn insert_leaf(&self, path: &Path, kind: NodeKind) {
        let path = key(path);
        let mut state = self.state.write();
        let dev = state.dev_of_parent(&path);
        state.nodes.insert(
            path,
            Node {
                kind,
                modified: UtcTime::default(),
                dev,
            },
        );
    }

    /// Delete a file (any non-directory) as a FUSE process or kubelet would.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.state.write().nodes.remove(&key(path.as_ref()));
    }

    pub fn set_modified(&self, path: impl AsRef<Path>, modified: UtcTime) {
        if let Some(node) = self.state.write().nodes.get_mut(&key(path.as_ref())) {
            node.modified = modified;
        }
    }

    /// Put `path` on its own device, as a mount would.
    pub fn set_dev(&self, path: impl AsRef<Path>, dev: u64) {
        if let Some(node) = self.state.write().nodes.get_mut(&key(path.as_ref())) {
            node.dev = dev;
        }
    }

    /// Register the contents returned for a mount table source.
    pub fn set_mount_table(&self, source: impl AsRef<Path>, contents: impl Into<String>) {
        self.state
            .write()
            .mount_tables
            .insert(source.as_ref().to_path_buf(), contents.into());
    }

    /// Swap the mount table at `source` for `contents` once it has been read
    /// `reads` more times, as if something mounted in between.
    pub fn replace_mount_table_after_reads(
        &self,
        source: impl AsRef<Path>,
        reads: usize,
        contents: impl Into<String>,
    ) {
        let source = source.as_ref().to_path_buf();
        let mut state = self.state.write();
        if reads == 0 {
            state.mount_tables.insert(source, contents.into());
        } else {
            state.pending_tables.insert(source, (reads, contents.into()));
        }
    }

    /// Make the mount table at `source` unreadable.
    pub fn remove_mount_table(&self, source: impl AsRef<Path>) {
        self.state.write().mount_tables.remove(source.as_ref());
    }

    /// Make every future removal of `path` fail with a permission error.
    pub fn fail_removal(&self, path: impl AsRef<Path>) {
        self.state.write().failing_removals.insert(key(path.as_ref()));
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.read().nodes.contains_key(&key(path.as_ref()))
    }

    /// Every directory successfully removed, in order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.state.read().removed.clone()
    }

    /// Number of successful removals; the only mutation the reclaimer makes.
    pub fn mutation_count(&self) -> usize {
        self.state.read().removed.len()
    }
}

impl Default for MemoryHostFs {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFs for MemoryHostFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryMeta> {
        let state = self.state.read();
        let node = state.nodes.get(&key(path)).ok_or_else(|| not_found(path))?;
        Ok(EntryMeta {
            is_dir: matches!(node.kind, NodeKind::Dir),
            modified: node.modified,
            dev: node.dev,
        })
    }

    fn list_children(&self, path: &Path) -> io::Result<Vec<DirChild>> {
        let dir = key(path);
        let state = self.state.read();
        match state.nodes.get(&dir).map(|n| &n.kind) {
            Some(NodeKind::Dir) => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: not a directory", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        Ok(state
            .children(&dir)
            .filter_map(|(p, node)| {
                p.file_name().map(|name| DirChild {
                    name: OsString::from(name),
                    is_dir: matches!(node.kind, NodeKind::Dir),
                })
            })
            .collect())
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        let dir = key(path);
        let mut state = self.state.write();
        match state.nodes.get(&dir).map(|n| &n.kind) {
            Some(NodeKind::Dir) => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: not a directory", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        if state.failing_removals.contains(&dir) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", path.display()),
            ));
        }
        if state.children(&dir).next().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: directory not empty", path.display()),
            ));
        }
        state.nodes.remove(&dir);
        state.removed.push(dir);
        Ok(())
    }

    fn read_mount_table(&self, source: &Path) -> io::Result<String> {
        let mut state = self.state.write();
        let contents = state
            .mount_tables
            .get(source)
            .cloned()
            .ok_or_else(|| not_found(source))?;

        let due = match state.pending_tables.get_mut(source) {
            Some((reads, _)) => {
                *reads -= 1;
                *reads == 0
            }
            None => false,
        };
        if due {
            if let Some((_, next)) = state.pending_tables.remove(source) {
                state.mount_tables.insert(source.to_path_buf(), next);
            }
        }
        Ok(contents)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.state.read();
        let mut pending: VecDeque<OsString> = normal_components(&key(path));
        let mut resolved = PathBuf::from("/");
        let mut hops = 0;

        while let Some(name) = pending.pop_front() {
            let candidate = resolved.join(&name);
            match state.nodes.get(&candidate).map(|n| &n.kind) {
                None => return Err(not_found(path)),
                Some(NodeKind::Symlink(target)) => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            format!("{}: too many levels of symbolic links", path.display()),
                        ));
                    }
                    let mut next = normal_components(&key(&join_path(&resolved, target)));
                    next.extend(pending.drain(..));
                    pending = next;
                    resolved = PathBuf::from("/");
                }
                Some(_) => resolved = candidate,
            }
        }
        Ok(resolved)
    }
}

fn normal_components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_os_string()),
            _ => None,
        })
        .collect()
}
