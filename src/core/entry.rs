//! 文件树节点

use crate::core::checksum::calculate_hash;
use crate::storage::{self, FileId, Storage};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// 文件树中的一个节点（目录或普通文件）
///
/// 文件节点在内存中保存完整内容及其摘要；目录节点独占其子节点列表，
/// 子节点只通过 [`Entry::refresh_children`] 整体重建。
#[derive(Debug, Clone)]
pub struct Entry {
    path: PathBuf,
    kind: EntryKind,
    content: Bytes,
    checksum: Option<String>,
    children: Vec<Entry>,
}

impl Entry {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), EntryKind::Directory)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), EntryKind::File)
    }

    fn new(path: PathBuf, kind: EntryKind) -> Self {
        Self {
            path,
            kind,
            content: Bytes::new(),
            checksum: None,
            children: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// 替换内存中的内容并重新计算摘要
    pub fn set_content(&mut self, content: Bytes) {
        self.checksum = Some(calculate_hash(&content));
        self.content = content;
    }

    pub fn children(&self) -> &[Entry] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.children
    }

    /// 不带子节点的副本（内容缓冲区共享）
    pub fn detached(&self) -> Entry {
        Entry {
            path: self.path.clone(),
            kind: self.kind,
            content: self.content.clone(),
            checksum: self.checksum.clone(),
            children: Vec::new(),
        }
    }

    /// 同类型、同内容、位于另一路径的对应节点
    pub fn counterpart(&self, path: PathBuf) -> Entry {
        let mut entry = self.detached();
        entry.path = path;
        entry
    }

    /// 采用另一个节点的内容（共享缓冲区，不重新计算摘要）
    pub fn adopt_content(&mut self, other: &Entry) {
        self.content = other.content.clone();
        self.checksum = other.checksum.clone();
    }

    /// 查询当前路径上对象的标识
    pub async fn identity(&self, storage: &dyn Storage) -> storage::Result<FileId> {
        Ok(storage.stat(&self.path).await?.id)
    }

    /// 在磁盘上创建节点：目录连同父目录一起创建，文件写入内容
    pub async fn create(&self, storage: &dyn Storage) -> storage::Result<()> {
        match self.kind {
            EntryKind::Directory => {
                info!("创建目录: {}", self.path.display());
                storage.create_dir_all(&self.path).await
            }
            EntryKind::File => {
                info!("创建文件: {}", self.path.display());
                storage.write(&self.path, &self.content).await
            }
        }
    }

    /// 从磁盘删除节点：目录递归删除
    pub async fn remove(&self, storage: &dyn Storage) -> storage::Result<()> {
        match self.kind {
            EntryKind::Directory => {
                info!("删除目录: {}", self.path.display());
                storage.delete_dir_all(&self.path).await
            }
            EntryKind::File => {
                info!("删除文件: {}", self.path.display());
                storage.delete_file(&self.path).await
            }
        }
    }

    /// 迁移到新路径：删除旧路径，更新路径，在新路径重新创建
    ///
    /// 旧路径上已不存在该节点时返回 NotFound，此时路径保持不变。
    /// 删除与创建之间不是原子的。
    pub async fn move_to(&mut self, new_path: PathBuf, storage: &dyn Storage) -> storage::Result<()> {
        info!("迁移 {} -> {}", self.path.display(), new_path.display());
        self.remove(storage).await?;
        self.path = new_path;
        self.create(storage).await
    }

    /// 重新列出直接子节点，替换内存中的子节点列表（仅目录）
    pub async fn refresh_children(&mut self, storage: &dyn Storage) -> storage::Result<()> {
        if !self.is_dir() {
            return Ok(());
        }
        let listed = storage.list_dir(&self.path).await?;
        self.children = listed
            .into_iter()
            .map(|info| {
                if info.is_dir {
                    Entry::directory(info.path)
                } else {
                    Entry::file(info.path)
                }
            })
            .collect();
        Ok(())
    }

    /// 从磁盘读取文件内容到内存（仅文件）
    pub async fn load_content(&mut self, storage: &dyn Storage) -> storage::Result<()> {
        if self.is_dir() {
            return Ok(());
        }
        let data = storage.read(&self.path).await?;
        debug!("已读取 {} ({} 字节)", self.path.display(), data.len());
        self.set_content(Bytes::from(data));
        Ok(())
    }
}
