use crate::core::entry::Entry;
use crate::core::scanner::{EntryVisitor, RefreshChildren, TreeWalker};
use crate::core::tracker::{IdentityTracker, ObserveIdentity, TrackedRecord};
use crate::error::{Result, SyncError};
use crate::storage::{FileId, Storage};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 单次同步报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub start_time: i64,
    pub end_time: i64,
    /// 耗时（毫秒）
    pub duration: u64,
    pub files_tracked: usize,
    pub created: usize,
    pub removed: usize,
    pub moved: usize,
    pub rewritten: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    fn begin() -> Self {
        Self {
            start_time: chrono::Utc::now().timestamp(),
            ..Default::default()
        }
    }

    fn finish(&mut self, started: Instant, files_tracked: usize) {
        self.end_time = chrono::Utc::now().timestamp();
        self.duration = started.elapsed().as_millis() as u64;
        self.files_tracked = files_tracked;
    }

    fn fail(&mut self, message: String) {
        warn!("{}", message);
        self.failed += 1;
        self.errors.push(message);
    }

    /// 本次同步是否没有对副本做任何修改
    pub fn is_noop(&self) -> bool {
        self.created == 0
            && self.removed == 0
            && self.moved == 0
            && self.rewritten == 0
            && self.failed == 0
    }
}

/// 源根目录与副本根目录，负责两侧路径的对应关系
#[derive(Debug, Clone)]
struct Roots {
    source: PathBuf,
    replica: PathBuf,
}

impl Roots {
    fn replica_path_for(&self, source_path: &Path) -> Result<PathBuf> {
        let relative = source_path
            .strip_prefix(&self.source)
            .map_err(|_| SyncError::OutsideRoot {
                path: source_path.to_path_buf(),
                root: self.source.clone(),
            })?;
        if relative.as_os_str().is_empty() {
            Ok(self.replica.clone())
        } else {
            Ok(self.replica.join(relative))
        }
    }
}

/// 标识在本次扫描后的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Live,
    /// 路径已不存在，或路径上已是另一个对象
    Gone,
    /// 标识被操作系统复用给了不同类型的对象
    Reused,
}

/// 单个标识的对账结果
#[derive(Debug, Default)]
struct Outcome {
    moved: bool,
    rewritten: bool,
}

/// 已就位的副本路径 -> 占用它的标识
///
/// 只登记副本路径已等于目标路径的记录。删除或迁移一个旧副本前先检查这里，
/// 旧路径（或其下）若已有其他节点的副本，就不能删除。
#[derive(Debug, Default)]
struct Placement {
    paths: BTreeMap<PathBuf, BTreeSet<FileId>>,
}

impl Placement {
    fn collect(tracker: &IdentityTracker, roots: &Roots) -> Self {
        let mut placement = Self::default();
        for (id, record) in tracker.iter() {
            let (Some(source), Some(replica)) = (record.source.as_ref(), record.replica.as_ref())
            else {
                continue;
            };
            if let Ok(target) = roots.replica_path_for(source.path()) {
                if target.as_path() == replica.path() {
                    placement.claim(*id, replica.path());
                }
            }
        }
        placement
    }

    fn claim(&mut self, id: FileId, path: &Path) {
        self.paths.entry(path.to_path_buf()).or_default().insert(id);
    }

    fn release(&mut self, id: FileId, path: &Path) {
        if let Some(ids) = self.paths.get_mut(path) {
            ids.remove(&id);
            if ids.is_empty() {
                self.paths.remove(path);
            }
        }
    }

    /// `path` 本身或其下是否有其他标识已就位的副本
    fn is_taken(&self, path: &Path, id: FileId) -> bool {
        // 按组件排序，子路径紧跟在 path 之后
        self.paths
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(|(claimed, _)| claimed.starts_with(path))
            .any(|(_, ids)| ids.iter().any(|other| *other != id))
    }
}

/// 同步引擎：维护源树、副本树与标识跟踪表
pub struct Synchronizer {
    storage: Arc<dyn Storage>,
    source: Entry,
    replica: Entry,
    tracker: IdentityTracker,
}

impl Synchronizer {
    /// 创建同步器
    ///
    /// 源目录不存在时返回 [`SyncError::SourceMissing`]；副本目录已存在时会被整体删除。
    pub async fn new(
        storage: Arc<dyn Storage>,
        source_root: PathBuf,
        replica_root: PathBuf,
    ) -> Result<Self> {
        if !storage.exists(&source_root).await? {
            error!("源目录不存在: {}", source_root.display());
            return Err(SyncError::SourceMissing(source_root));
        }

        match storage.stat(&replica_root).await {
            Ok(meta) => {
                warn!("副本目录已存在，将被清空: {}", replica_root.display());
                if meta.is_dir {
                    storage.delete_dir_all(&replica_root).await?;
                } else {
                    storage.delete_file(&replica_root).await?;
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        info!(
            "同步器就绪: {} -> {} ({})",
            source_root.display(),
            replica_root.display(),
            storage.name()
        );

        Ok(Self {
            storage,
            source: Entry::directory(source_root),
            replica: Entry::directory(replica_root),
            tracker: IdentityTracker::new(),
        })
    }

    pub fn source_root(&self) -> &Path {
        self.source.path()
    }

    pub fn replica_root(&self) -> &Path {
        self.replica.path()
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    fn roots(&self) -> Roots {
        Roots {
            source: self.source.path().to_path_buf(),
            replica: self.replica.path().to_path_buf(),
        }
    }

    /// 首次全量复制
    pub async fn initialize(&mut self) -> Result<SyncReport> {
        info!("初始化...");
        let started = Instant::now();
        let mut report = SyncReport::begin();
        let roots = self.roots();

        self.rescan().await?;

        let storage = self.storage.as_ref();
        let mut replicate = ReplicateAll {
            tracker: &mut self.tracker,
            storage,
            roots: &roots,
            report: &mut report,
        };
        TreeWalker::new(storage)
            .walk(&mut self.source, &mut replicate)
            .await?;

        report.finish(started, self.tracker.len());
        info!(
            "初始化完成: 跟踪 {} 个节点, 复制 {} 个, 失败 {} 个",
            report.files_tracked, report.created, report.failed
        );
        Ok(report)
    }

    /// 执行一次同步
    pub async fn sync(&mut self) -> Result<SyncReport> {
        info!(
            "正在同步 {} -> {}",
            self.source.path().display(),
            self.replica.path().display()
        );
        let started = Instant::now();
        let mut report = SyncReport::begin();
        let roots = self.roots();
        let storage = Arc::clone(&self.storage);
        let storage = storage.as_ref();

        // 源根目录暂时不可见（如卸载）时不能把副本当作全部删除处理
        if !storage.exists(self.source.path()).await? {
            error!("源目录不存在，跳过本次同步: {}", self.source.path().display());
            return Err(SyncError::SourceMissing(self.source.path().to_path_buf()));
        }

        // 1. 扫描前的标识快照
        let snapshot = self.tracker.ids();

        // 2. 重新扫描源树
        self.rescan().await?;

        // 3. 分类已删除 / 被复用的标识
        let mut deleted = Vec::new();
        let mut reused = Vec::new();
        for id in &snapshot {
            let Some(record) = self.tracker.get(id) else {
                continue;
            };
            match liveness(storage, *id, record).await {
                Ok(Liveness::Gone) => deleted.push(*id),
                Ok(Liveness::Reused) => reused.push(*id),
                Ok(Liveness::Live) => {}
                Err(e) => report.fail(format!("检查 {} 失败: {}", id, e)),
            }
        }

        // 4. 新增标识
        let mut new_ids: BTreeSet<FileId> =
            self.tracker.ids().difference(&snapshot).copied().collect();

        // 5. 删除副本
        let mut stale = Vec::new();
        for id in &deleted {
            if let Some(replica) = self.tracker.remove(id).and_then(|r| r.replica) {
                stale.push((*id, replica));
            }
        }
        for id in reused {
            info!("标识 {} 已被新对象复用，按删除后新建处理", id);
            if let Some(replica) = self.tracker.get_mut(&id).and_then(|r| r.replica.take()) {
                stale.push((id, replica));
            }
            new_ids.insert(id);
        }
        let mut placement = Placement::collect(&self.tracker, &roots);
        for (id, replica) in &stale {
            if placement.is_taken(replica.path(), *id) {
                info!("{} 已被其他节点占用，跳过删除", replica.path().display());
                continue;
            }
            remove_replica(storage, replica, &mut report).await;
        }
        // 之前复制失败、仍缺副本的记录也重新复制
        new_ids.extend(
            self.tracker
                .iter()
                .filter(|(_, r)| r.replica.is_none())
                .map(|(id, _)| *id),
        );

        // 6. 复制新增节点
        for id in &new_ids {
            let Some(source) = self.tracker.get(id).and_then(|r| r.source.clone()) else {
                continue;
            };
            match replicate(storage, &mut self.tracker, *id, &source, &roots).await {
                Ok(path) => {
                    placement.claim(*id, &path);
                    report.created += 1;
                }
                Err(e) => report.fail(format!("复制 {} 失败: {}", source.path().display(), e)),
            }
        }

        // 7. 移动 / 内容变更
        for (id, record) in self.tracker.iter_mut() {
            if new_ids.contains(id) {
                continue;
            }
            let (Some(source), Some(replica)) = (record.source.as_ref(), record.replica.as_mut())
            else {
                continue;
            };
            let old_path = replica.path().to_path_buf();
            let vacate = !placement.is_taken(&old_path, *id);
            match reconcile(storage, source, replica, &roots, vacate).await {
                Ok(outcome) => {
                    placement.claim(*id, replica.path());
                    if outcome.moved {
                        report.moved += 1;
                    }
                    if outcome.rewritten {
                        report.rewritten += 1;
                    }
                    if !outcome.moved && !outcome.rewritten {
                        report.unchanged += 1;
                    }
                }
                Err(e) => {
                    report.fail(format!("同步 {} 失败: {}", source.path().display(), e));
                    // 副本状态未知，下次同步重新复制
                    placement.release(*id, &old_path);
                    record.replica = None;
                }
            }
        }

        report.finish(started, self.tracker.len());
        Ok(report)
    }

    /// 刷新每个目录的子节点，然后重新登记每个节点的标识
    async fn rescan(&mut self) -> Result<()> {
        let storage = self.storage.as_ref();
        let walker = TreeWalker::new(storage);

        let stats = walker
            .walk(&mut self.source, &mut RefreshChildren::new(storage))
            .await?;
        debug!(
            "扫描完成: {} 个目录, {} 个文件, {} 个已消失",
            stats.directories, stats.files, stats.vanished
        );

        walker
            .walk(
                &mut self.source,
                &mut ObserveIdentity::new(&mut self.tracker, storage),
            )
            .await?;
        Ok(())
    }
}

/// 初始化时为每个节点创建副本
struct ReplicateAll<'a> {
    tracker: &'a mut IdentityTracker,
    storage: &'a dyn Storage,
    roots: &'a Roots,
    report: &'a mut SyncReport,
}

#[async_trait]
impl<'a> EntryVisitor for ReplicateAll<'a> {
    async fn visit(&mut self, entry: &mut Entry) -> Result<()> {
        let id = match entry.identity(self.storage).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => {
                debug!("复制前节点已消失: {}", entry.path().display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        match replicate(self.storage, self.tracker, id, entry, self.roots).await {
            Ok(_) => self.report.created += 1,
            Err(e) => self
                .report
                .fail(format!("复制 {} 失败: {}", entry.path().display(), e)),
        }
        Ok(())
    }
}

async fn liveness(storage: &dyn Storage, id: FileId, record: &TrackedRecord) -> Result<Liveness> {
    let Some(source) = record.source.as_ref() else {
        return Ok(Liveness::Gone);
    };
    match storage.stat(source.path()).await {
        Err(e) if e.is_not_found() => Ok(Liveness::Gone),
        Err(e) => Err(e.into()),
        Ok(meta) if meta.id != id => Ok(Liveness::Gone),
        Ok(meta) => {
            let kind_changed = source.is_dir() != meta.is_dir
                || record
                    .replica
                    .as_ref()
                    .is_some_and(|r| r.is_dir() != meta.is_dir);
            if kind_changed {
                Ok(Liveness::Reused)
            } else {
                Ok(Liveness::Live)
            }
        }
    }
}

/// 在对应路径创建副本，并登记为记录的副本侧，返回副本路径
async fn replicate(
    storage: &dyn Storage,
    tracker: &mut IdentityTracker,
    id: FileId,
    source: &Entry,
    roots: &Roots,
) -> Result<PathBuf> {
    let path = roots.replica_path_for(source.path())?;
    let replica = source.counterpart(path.clone());
    replica.create(storage).await?;
    if let Some(record) = tracker.get_mut(&id) {
        record.replica = Some(replica);
    }
    Ok(path)
}

async fn remove_replica(storage: &dyn Storage, replica: &Entry, report: &mut SyncReport) {
    info!("尝试删除副本 {}", replica.path().display());
    match replica.remove(storage).await {
        Ok(()) => {
            info!("副本已删除: {}", replica.path().display());
            report.removed += 1;
        }
        Err(e) if e.is_not_found() => {
            info!("{} 此前已被删除", replica.path().display());
        }
        Err(e) => report.fail(format!("删除副本 {} 失败: {}", replica.path().display(), e)),
    }
}

/// 对单个标识执行移动检查，然后执行内容检查
///
/// `vacate` 为 false 时旧路径已归其他节点所有，移动只在新路径创建。
async fn reconcile(
    storage: &dyn Storage,
    source: &Entry,
    replica: &mut Entry,
    roots: &Roots,
    vacate: bool,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();

    let target = roots.replica_path_for(source.path())?;
    if replica.path() != target.as_path() {
        info!(
            "{} 已移动到 {}",
            replica.path().display(),
            target.display()
        );
        let moved = if vacate {
            replica.move_to(target.clone(), storage).await
        } else {
            info!("{} 已被其他节点占用，保留旧位置", replica.path().display());
            replica.set_path(target.clone());
            replica.create(storage).await
        };
        match moved {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(
                    "副本 {} 已不存在，直接在新位置创建",
                    replica.path().display()
                );
                replica.set_path(target);
                replica.create(storage).await?;
            }
            Err(e) => return Err(e.into()),
        }
        outcome.moved = true;
    }

    if !source.is_dir() && replica.checksum() != source.checksum() {
        info!("{} 的内容已变更", source.path().display());
        debug!(
            "{} 的新内容为 {} 字节",
            replica.path().display(),
            source.content().len()
        );
        replica.adopt_content(source);
        replica.create(storage).await?;
        outcome.rewritten = true;
    }

    Ok(outcome)
}
