use crate::core::entry::Entry;
use crate::error::Result;
use crate::storage::Storage;
use async_trait::async_trait;
use tracing::debug;

/// 对树中每个节点执行的操作
#[async_trait]
pub trait EntryVisitor: Send {
    async fn visit(&mut self, entry: &mut Entry) -> Result<()>;
}

/// 遍历统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories: usize,
    pub files: usize,
    /// 列出后、读取前就已消失的节点
    pub vanished: usize,
}

/// 深度优先遍历文件树
///
/// 每个节点恰好访问一次，父节点先于子节点。文件在交给 visitor 之前
/// 从磁盘重新读取内容；目录在 visitor 执行之后才展开子节点，因此
/// [`RefreshChildren`] 刷新出来的子节点会在同一次遍历中被访问。
/// 遍历器本身不改变树的形状。
pub struct TreeWalker<'a> {
    storage: &'a dyn Storage,
}

impl<'a> TreeWalker<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    pub async fn walk<V>(&self, root: &mut Entry, visitor: &mut V) -> Result<WalkStats>
    where
        V: EntryVisitor + ?Sized,
    {
        let mut stats = WalkStats::default();
        // 显式栈，避免深层目录导致调用栈过深
        let mut stack: Vec<&mut Entry> = vec![root];

        while let Some(entry) = stack.pop() {
            if !entry.is_dir() {
                match entry.load_content(self.storage).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!("扫描期间文件已消失: {}", entry.path().display());
                        stats.vanished += 1;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
                visitor.visit(entry).await?;
                stats.files += 1;
                continue;
            }

            visitor.visit(entry).await?;
            stats.directories += 1;
            stack.extend(entry.children_mut().iter_mut());
        }

        Ok(stats)
    }
}

/// 从磁盘重新列出每个目录的子节点
pub struct RefreshChildren<'a> {
    storage: &'a dyn Storage,
}

impl<'a> RefreshChildren<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<'a> EntryVisitor for RefreshChildren<'a> {
    async fn visit(&mut self, entry: &mut Entry) -> Result<()> {
        match entry.refresh_children(self.storage).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("扫描期间目录已消失: {}", entry.path().display());
                entry.children_mut().clear();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
