//! An in-memory, POSIX-flavored filesystem used by the simulated device.
//! Grounded on the original `adb_server/filesystem.py`: a flat map of
//! normalized paths to entries plus a parallel parent→children index.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::BackendError;

pub const TYPE_DIR: u32 = 0o040000;
pub const TYPE_SYMLINK: u32 = 0o120000;
pub const TYPE_FILE: u32 = 0o100000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Dir,
    Symlink,
}

impl NodeType {
    pub fn type_bits(self) -> u32 {
        match self {
            NodeType::Dir => TYPE_DIR,
            NodeType::Symlink => TYPE_SYMLINK,
            NodeType::File => TYPE_FILE,
        }
    }

    fn prefix_char(self) -> char {
        match self {
            NodeType::File => '-',
            NodeType::Dir => 'd',
            NodeType::Symlink => 'l',
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub path: String,
    pub node_type: NodeType,
    pub permissions: u32,
    pub owner: String,
    pub group: String,
    pub content: Vec<u8>,
    pub link_target: Option<String>,
}

impl Entry {
    fn name(&self) -> &str {
        if self.path == "/" {
            return "/";
        }
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Mode as reported by STAT/DENT and `ls -l`: permission bits OR'd
    /// with the POSIX node-type bits.
    pub fn mode(&self) -> u32 {
        self.permissions | self.node_type.type_bits()
    }

    pub fn size(&self) -> u32 {
        if self.node_type == NodeType::File { self.content.len() as u32 } else { 0 }
    }
}

pub struct Filesystem {
    entries: BTreeMap<String, Entry>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl Default for Filesystem {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "/".to_string(),
            Entry {
                path: "/".to_string(),
                node_type: NodeType::Dir,
                permissions: 0o755,
                owner: "root".to_string(),
                group: "root".to_string(),
                content: Vec::new(),
                link_target: None,
            },
        );
        let mut children = BTreeMap::new();
        children.insert("/".to_string(), BTreeSet::new());
        Self { entries, children }
    }
}

/// Joins `path` against `cwd` (if relative) and resolves `.`/`..`
/// segments, returning an absolute, normalized path with no trailing
/// slash (except the root itself).
pub fn normalize(path: &str, cwd: &str) -> String {
    let joined = if path.starts_with('/') { path.to_string() } else { format!("{cwd}/{path}") };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

impl Filesystem {
    pub fn exists(&self, path: &str, cwd: &str) -> bool {
        self.entries.contains_key(&normalize(path, cwd))
    }

    /// Looks up an entry, following a symlink chain when `follow` is set.
    pub fn get_entry(&self, path: &str, cwd: &str, follow: bool) -> Result<Entry, BackendError> {
        let normalized = normalize(path, cwd);
        let entry = self.entries.get(&normalized).ok_or_else(|| BackendError::NotFound(normalized.clone()))?;
        if follow {
            self.resolve_symlink(entry.clone())
        } else {
            Ok(entry.clone())
        }
    }

    fn resolve_symlink(&self, entry: Entry) -> Result<Entry, BackendError> {
        if entry.node_type != NodeType::Symlink {
            return Ok(entry);
        }
        let target = entry.link_target.as_deref().unwrap_or("/");
        let normalized = normalize(target, "/");
        let resolved = self
            .entries
            .get(&normalized)
            .ok_or_else(|| BackendError::DanglingSymlink(entry.path.clone()))?;
        self.resolve_symlink(resolved.clone())
    }

    pub fn list_dir(&self, path: &str, cwd: &str) -> Result<Vec<Entry>, BackendError> {
        let entry = self.get_entry(path, cwd, true)?;
        if entry.node_type != NodeType::Dir {
            return Err(BackendError::NotADirectory(entry.path));
        }
        let children = self.children.get(&entry.path).cloned().unwrap_or_default();
        Ok(children.into_iter().filter_map(|child| self.entries.get(&child).cloned()).collect())
    }

    pub fn read_file(&self, path: &str, cwd: &str) -> Result<Vec<u8>, BackendError> {
        let entry = self.get_entry(path, cwd, true)?;
        if entry.node_type != NodeType::File {
            return Err(BackendError::NotAFile(entry.path));
        }
        Ok(entry.content)
    }

    fn parent_of(path: &str) -> String {
        if path == "/" {
            return "/".to_string();
        }
        match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => "/".to_string(),
        }
    }

    fn ensure_directory(&mut self, path: &str) -> Result<(), BackendError> {
        if path == "/" {
            return Ok(());
        }
        if let Some(entry) = self.entries.get(path) {
            return if entry.node_type == NodeType::Dir {
                Ok(())
            } else {
                Err(BackendError::NotADirectory(path.to_string()))
            };
        }
        let parent = Self::parent_of(path);
        self.ensure_directory(&parent)?;
        self.insert_entry(Entry {
            path: path.to_string(),
            node_type: NodeType::Dir,
            permissions: 0o755,
            owner: "root".to_string(),
            group: "root".to_string(),
            content: Vec::new(),
            link_target: None,
        })
    }

    fn insert_entry(&mut self, entry: Entry) -> Result<(), BackendError> {
        let parent = Self::parent_of(&entry.path);
        self.children.entry(entry.path.clone()).or_default();
        self.children.entry(parent).or_default().insert(entry.path.clone());
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    fn remove_entry(&mut self, path: &str) -> Result<Entry, BackendError> {
        let entry = self.entries.remove(path).ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let parent = Self::parent_of(path);
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.remove(path);
        }
        self.children.remove(path);
        Ok(entry)
    }

    pub fn write_file(&mut self, path: &str, cwd: &str, data: Vec<u8>, mode: u32) -> Result<(), BackendError> {
        let normalized = normalize(path, cwd);
        if let Some(existing) = self.entries.get_mut(&normalized) {
            if existing.node_type != NodeType::File {
                return Err(BackendError::NotAFile(normalized));
            }
            existing.content = data;
            existing.permissions = mode;
            return Ok(());
        }
        let parent = Self::parent_of(&normalized);
        self.ensure_directory(&parent)?;
        self.insert_entry(Entry {
            path: normalized,
            node_type: NodeType::File,
            permissions: mode,
            owner: "shell".to_string(),
            group: "shell".to_string(),
            content: data,
            link_target: None,
        })
    }

    pub fn mkdir(&mut self, path: &str, cwd: &str, parents: bool) -> Result<(), BackendError> {
        let normalized = normalize(path, cwd);
        if self.entries.contains_key(&normalized) {
            return Ok(());
        }
        let parent = Self::parent_of(&normalized);
        if !self.entries.contains_key(&parent) {
            if parents {
                self.ensure_directory(&parent)?;
            } else {
                return Err(BackendError::MissingParent(parent));
            }
        }
        self.insert_entry(Entry {
            path: normalized,
            node_type: NodeType::Dir,
            permissions: 0o755,
            owner: "root".to_string(),
            group: "root".to_string(),
            content: Vec::new(),
            link_target: None,
        })
    }

    pub fn remove(&mut self, path: &str, cwd: &str, recursive: bool) -> Result<(), BackendError> {
        let normalized = normalize(path, cwd);
        let entry = self.entries.get(&normalized).ok_or_else(|| BackendError::NotFound(normalized.clone()))?.clone();
        if entry.node_type == NodeType::Dir {
            let children = self.children.get(&normalized).cloned().unwrap_or_default();
            if !children.is_empty() && !recursive {
                return Err(BackendError::NotEmpty(normalized));
            }
            for child in children {
                self.remove(&child, "/", true)?;
            }
        }
        self.remove_entry(&normalized)?;
        Ok(())
    }

    pub fn copy(&mut self, source: &str, destination: &str, cwd: &str, recursive: bool) -> Result<(), BackendError> {
        let src = self.get_entry(source, cwd, false)?;
        let dest_path = normalize(destination, cwd);
        if src.node_type == NodeType::Dir {
            if !recursive {
                return Err(BackendError::Other("recursive flag required to copy directories".into()));
            }
            self.mkdir(&dest_path, "/", true)?;
            let children = self.children.get(&src.path).cloned().unwrap_or_default();
            for child in children {
                let rel = &child[src.path.len()..];
                let child_dest = format!("{dest_path}{rel}");
                self.copy(&child, &child_dest, "/", true)?;
            }
            return Ok(());
        }
        self.write_file(&dest_path, "/", src.content.clone(), src.permissions)
    }

    pub fn rename(&mut self, source: &str, destination: &str, cwd: &str) -> Result<(), BackendError> {
        let src = self.get_entry(source, cwd, false)?;
        let dest_path = normalize(destination, cwd);
        if self.entries.contains_key(&dest_path) {
            self.remove(&dest_path, "/", true)?;
        }
        let parent = Self::parent_of(&dest_path);
        self.ensure_directory(&parent)?;

        let mut subtree: Vec<(String, Entry)> = Vec::new();
        let prefix = format!("{}/", src.path);
        for (path, entry) in self.entries.iter() {
            if *path == src.path || path.starts_with(&prefix) {
                subtree.push((path.clone(), entry.clone()));
            }
        }
        // Deepest paths first so children are detached before their parent.
        subtree.sort_by_key(|(path, _)| std::cmp::Reverse(path.matches('/').count()));
        for (path, _) in &subtree {
            self.remove_entry(path)?;
        }
        // Shallowest first so parents exist before children are recreated.
        subtree.sort_by_key(|(path, _)| path.matches('/').count());
        for (path, mut entry) in subtree {
            let new_path = if path == src.path { dest_path.clone() } else { format!("{dest_path}{}", &path[src.path.len()..]) };
            entry.path = new_path.clone();
            self.insert_entry(entry)?;
        }
        Ok(())
    }

    pub fn set_permissions(&mut self, path: &str, cwd: &str, mode: u32) -> Result<(), BackendError> {
        let normalized = normalize(path, cwd);
        let entry = self.entries.get_mut(&normalized).ok_or_else(|| BackendError::NotFound(normalized))?;
        entry.permissions = mode;
        Ok(())
    }

    pub fn set_owner(&mut self, path: &str, cwd: &str, owner: &str, group: Option<&str>) -> Result<(), BackendError> {
        let normalized = normalize(path, cwd);
        let entry = self.entries.get_mut(&normalized).ok_or_else(|| BackendError::NotFound(normalized))?;
        entry.owner = owner.to_string();
        if let Some(group) = group {
            entry.group = group.to_string();
        }
        Ok(())
    }

    pub fn format_permissions(mode: u32, node_type: NodeType) -> String {
        let mut out = String::with_capacity(10);
        out.push(node_type.prefix_char());
        for (idx, ch) in "rwxrwxrwx".chars().enumerate() {
            let bit = 1u32 << (8 - idx);
            out.push(if mode & bit != 0 { ch } else { '-' });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = Filesystem::default();
        fs.write_file("/tmp/a", "/", b"ABC".to_vec(), 0o644).unwrap();
        assert_eq!(fs.read_file("/tmp/a", "/").unwrap(), b"ABC");
        let entry = fs.get_entry("/tmp/a", "/", true).unwrap();
        assert_eq!(entry.permissions, 0o644);
        assert_eq!(entry.mode(), 0o644 | TYPE_FILE);
    }

    #[test]
    fn missing_path_reports_not_found() {
        let fs = Filesystem::default();
        assert!(matches!(fs.get_entry("/nope", "/", true), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn mkdir_requires_parent_unless_recursive() {
        let mut fs = Filesystem::default();
        assert!(matches!(fs.mkdir("/a/b", "/", false), Err(BackendError::MissingParent(_))));
        fs.mkdir("/a/b", "/", true).unwrap();
        assert!(fs.exists("/a", "/"));
        assert!(fs.exists("/a/b", "/"));
    }

    #[test]
    fn remove_non_empty_dir_requires_recursive() {
        let mut fs = Filesystem::default();
        fs.mkdir("/a", "/", false).unwrap();
        fs.write_file("/a/f", "/", b"x".to_vec(), 0o644).unwrap();
        assert!(matches!(fs.remove("/a", "/", false), Err(BackendError::NotEmpty(_))));
        fs.remove("/a", "/", true).unwrap();
        assert!(!fs.exists("/a", "/"));
    }

    #[test]
    fn rename_moves_subtree() {
        let mut fs = Filesystem::default();
        fs.mkdir("/a", "/", false).unwrap();
        fs.write_file("/a/f", "/", b"x".to_vec(), 0o644).unwrap();
        fs.rename("/a", "/b", "/").unwrap();
        assert!(!fs.exists("/a", "/"));
        assert_eq!(fs.read_file("/b/f", "/").unwrap(), b"x");
    }

    #[test]
    fn normalize_resolves_dot_dot() {
        assert_eq!(normalize("../x", "/a/b"), "/a/x");
        assert_eq!(normalize("x", "/a"), "/a/x");
        assert_eq!(normalize("/a/../../b", "/"), "/b");
    }
}
