//! 标识跟踪 - 按文件标识关联源节点与副本节点，跨重命名识别同一个文件

use crate::core::entry::Entry;
use crate::core::scanner::EntryVisitor;
use crate::error::Result;
use crate::storage::{self, FileId, Storage};
use async_trait::async_trait;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use tracing::{debug, info};

/// 单个标识的跟踪记录
#[derive(Debug, Clone, Default)]
pub struct TrackedRecord {
    /// 最近一次扫描到的源节点
    pub source: Option<Entry>,
    /// 副本节点，首次复制之前为空
    pub replica: Option<Entry>,
}

/// 标识 -> {源, 副本} 映射
///
/// 使用 BTreeMap 保证同一次同步内的遍历顺序确定。
#[derive(Debug, Default)]
pub struct IdentityTracker {
    records: BTreeMap<FileId, TrackedRecord>,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询节点标识并记录为源节点
    ///
    /// 从不删除记录，删除由同步引擎在分类之后处理。
    pub async fn observe(&mut self, entry: &Entry, storage: &dyn Storage) -> storage::Result<FileId> {
        let id = entry.identity(storage).await?;
        self.record(id, entry);
        Ok(id)
    }

    /// 设置（或覆盖）记录的源节点
    pub fn record(&mut self, id: FileId, entry: &Entry) {
        let record = self.records.entry(id).or_insert_with(|| {
            info!("开始跟踪 {}", entry.path().display());
            TrackedRecord::default()
        });
        record.source = Some(entry.detached());
    }

    /// 当前所有被跟踪标识的快照
    pub fn ids(&self) -> BTreeSet<FileId> {
        self.records.keys().copied().collect()
    }

    pub fn get(&self, id: &FileId) -> Option<&TrackedRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &FileId) -> Option<&mut TrackedRecord> {
        self.records.get_mut(id)
    }

    pub fn remove(&mut self, id: &FileId) -> Option<TrackedRecord> {
        self.records.remove(id)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, FileId, TrackedRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, FileId, TrackedRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 对树中每个节点执行 [`IdentityTracker::observe`]
pub struct ObserveIdentity<'a> {
    tracker: &'a mut IdentityTracker,
    storage: &'a dyn Storage,
}

impl<'a> ObserveIdentity<'a> {
    pub fn new(tracker: &'a mut IdentityTracker, storage: &'a dyn Storage) -> Self {
        Self { tracker, storage }
    }
}

#[async_trait]
impl<'a> EntryVisitor for ObserveIdentity<'a> {
    async fn visit(&mut self, entry: &mut Entry) -> Result<()> {
        match self.tracker.observe(entry, self.storage).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("无法获取标识，节点已消失: {}", entry.path().display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
