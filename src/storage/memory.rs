//! 内存文件系统，仅用于测试
//!
//! inode 从空闲列表分配：删除一个节点后再创建的节点会复用它的标识，
//! 与真实文件系统的行为一致。

use super::{DirEntryInfo, FileId, FileMeta, Result, Storage, StorageError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DEVICE: u64 = 1;

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    inode: u64,
    kind: NodeKind,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    next_inode: u64,
    free: Vec<u64>,
    mutations: usize,
}

impl Inner {
    fn alloc(&mut self) -> u64 {
        if let Some(inode) = self.free.pop() {
            return inode;
        }
        self.next_inode += 1;
        self.next_inode
    }

    fn ensure_dirs(&mut self, path: &Path) -> Result<()> {
        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        for dir in ancestors {
            match self.nodes.get(dir) {
                Some(Node {
                    kind: NodeKind::Dir, ..
                }) => {}
                Some(_) => return Err(other(dir, "不是目录")),
                None => {
                    let inode = self.alloc();
                    self.nodes.insert(
                        dir.to_path_buf(),
                        Node {
                            inode,
                            kind: NodeKind::Dir,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn other(path: &Path, msg: &str) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, msg.to_string()),
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 移动节点（含子树），保留 inode，模拟 `mv`
    pub fn rename(&self, from: &Path, to: &Path) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let moved: Vec<PathBuf> = inner
            .nodes
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        assert!(!moved.is_empty(), "rename source missing: {:?}", from);
        for old in moved {
            let node = inner.nodes.remove(&old).unwrap();
            let suffix = old.strip_prefix(from).unwrap();
            let new = if suffix.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(suffix)
            };
            inner.nodes.insert(new, node);
        }
    }

    pub fn read_string(&self, path: &Path) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node {
                kind: NodeKind::File(data),
                ..
            }) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        matches!(
            inner.nodes.get(path),
            Some(Node {
                kind: NodeKind::Dir,
                ..
            })
        )
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().nodes.contains_key(path)
    }

    pub fn inode(&self, path: &Path) -> Option<u64> {
        self.inner.lock().unwrap().nodes.get(path).map(|n| n.inode)
    }

    /// 目前为止所有写入 / 删除 / 建目录调用的次数
    pub fn mutations(&self) -> usize {
        self.inner.lock().unwrap().mutations
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let inner = self.inner.lock().unwrap();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        let (is_dir, size) = match &node.kind {
            NodeKind::Dir => (true, 0),
            NodeKind::File(data) => (false, data.len() as u64),
        };
        Ok(FileMeta {
            id: FileId::new(DEVICE, node.inode),
            is_dir,
            size,
        })
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node {
                kind: NodeKind::Dir,
                ..
            }) => {}
            Some(_) => return Err(other(path, "不是目录")),
            None => return Err(StorageError::NotFound(path.to_path_buf())),
        }
        Ok(inner
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, node)| DirEntryInfo {
                path: p.clone(),
                is_dir: matches!(node.kind, NodeKind::Dir),
            })
            .collect())
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        match inner.nodes.get(path) {
            Some(Node {
                kind: NodeKind::File(data),
                ..
            }) => Ok(data.clone()),
            Some(_) => Err(other(path, "是目录")),
            None => Err(StorageError::NotFound(path.to_path_buf())),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.mutations += 1;
        if let Some(parent) = path.parent() {
            inner.ensure_dirs(parent)?;
        }
        match inner.nodes.get_mut(path) {
            Some(Node {
                kind: NodeKind::File(existing),
                ..
            }) => {
                *existing = data.to_vec();
            }
            Some(_) => return Err(other(path, "是目录")),
            None => {
                let inode = inner.alloc();
                inner.nodes.insert(
                    path.to_path_buf(),
                    Node {
                        inode,
                        kind: NodeKind::File(data.to_vec()),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.mutations += 1;
        match inner.nodes.get(path) {
            Some(Node {
                kind: NodeKind::File(_),
                ..
            }) => {}
            Some(_) => return Err(other(path, "是目录")),
            None => return Err(StorageError::NotFound(path.to_path_buf())),
        }
        if let Some(node) = inner.nodes.remove(path) {
            inner.free.push(node.inode);
        }
        Ok(())
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.mutations += 1;
        if !inner.nodes.contains_key(path) {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        let doomed: Vec<PathBuf> = inner
            .nodes
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in doomed {
            if let Some(node) = inner.nodes.remove(&p) {
                inner.free.push(node.inode);
            }
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.mutations += 1;
        inner.ensure_dirs(path)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deleted_inode_is_reused() {
        let fs = MemoryStorage::new();
        let a = Path::new("/root/a.txt");
        fs.write(a, b"a").await.unwrap();
        let old = fs.inode(a).unwrap();

        fs.delete_file(a).await.unwrap();
        fs.create_dir_all(Path::new("/root/b")).await.unwrap();

        assert_eq!(fs.inode(Path::new("/root/b")), Some(old));
    }

    #[tokio::test]
    async fn test_rename_keeps_subtree_inodes() {
        let fs = MemoryStorage::new();
        fs.write(Path::new("/s/d/f.txt"), b"f").await.unwrap();
        let inode = fs.inode(Path::new("/s/d/f.txt"));

        fs.rename(Path::new("/s/d"), Path::new("/s/e"));

        assert!(!fs.contains(Path::new("/s/d")));
        assert_eq!(fs.inode(Path::new("/s/e/f.txt")), inode);
        assert_eq!(fs.read_string(Path::new("/s/e/f.txt")).as_deref(), Some("f"));
    }
}
