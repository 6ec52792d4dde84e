//! 工作区文件监听
//!
//! 把 notify 的原始事件归一化为 `FileChange`，再转成缓存维护调用：
//! 修改/新建 → `invalidate_file`，删除 → `remove_file`，重命名 → 删除 + 修改。

use super::search::DebouncedSearch;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

const WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Modified(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(path) | FileChange::Removed(path) => path,
        }
    }
}

pub struct WorkspaceWatcher {
    watcher: RecommendedWatcher,
    raw_event_rx: mpsc::Receiver<notify::Event>,
    workspace_root: PathBuf,
}

impl WorkspaceWatcher {
    pub fn new(workspace_root: &Path) -> Result<Self, notify::Error> {
        let workspace_root = workspace_root
            .canonicalize()
            .unwrap_or_else(|_| workspace_root.to_path_buf());
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                let _ = tx.send(event);
            },
            Config::default().with_poll_interval(WATCHER_POLL_INTERVAL),
        )?;
        watcher.watch(&workspace_root, RecursiveMode::Recursive)?;
        Ok(Self {
            watcher,
            raw_event_rx: rx,
            workspace_root,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// 取出积压的事件：先删除后修改，同一路径只出现一次
    pub fn drain_changes(&mut self) -> Vec<FileChange> {
        let _watcher_guard = &self.watcher;

        let mut removed = FxHashSet::default();
        let mut modified = FxHashSet::default();
        while let Ok(event) = self.raw_event_rx.try_recv() {
            for change in classify(event) {
                if contains_ignored_component(change.path(), &self.workspace_root) {
                    continue;
                }
                match change {
                    FileChange::Removed(path) => {
                        modified.remove(&path);
                        removed.insert(path);
                    }
                    FileChange::Modified(path) => {
                        removed.remove(&path);
                        modified.insert(path);
                    }
                }
            }
        }

        let mut removed = removed.into_iter().collect::<Vec<_>>();
        removed.sort_unstable();
        let mut modified = modified.into_iter().collect::<Vec<_>>();
        modified.sort_unstable();

        removed
            .into_iter()
            .map(FileChange::Removed)
            .chain(modified.into_iter().map(FileChange::Modified))
            .collect()
    }

    /// 把积压的变化应用到搜索缓存，返回处理的变化数
    pub fn apply_to(&mut self, search: &DebouncedSearch) -> usize {
        let changes = self.drain_changes();
        apply_changes(&changes, search);
        changes.len()
    }
}

pub fn apply_changes(changes: &[FileChange], search: &DebouncedSearch) {
    for change in changes {
        match change {
            FileChange::Modified(path) => search.invalidate_file(path),
            FileChange::Removed(path) => search.remove_file(path),
        }
        tracing::debug!(change = ?change, "workspace change applied to search cache");
    }
}

/// notify 原始事件 → 文件变化
pub fn classify(event: notify::Event) -> Vec<FileChange> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FileChange::Modified).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FileChange::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let mut paths = event.paths.into_iter();
            let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                return Vec::new();
            };
            vec![FileChange::Removed(from), FileChange::Modified(to)]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(FileChange::Removed).collect()
        }
        EventKind::Modify(_) => event.paths.into_iter().map(FileChange::Modified).collect(),
        _ => Vec::new(),
    }
}

fn should_ignore(name: &str) -> bool {
    matches!(
        name,
        ".git" | ".DS_Store" | "Thumbs.db" | "desktop.ini" | "node_modules" | "target"
    )
}

fn contains_ignored_component(path: &Path, workspace_root: &Path) -> bool {
    let relative = path.strip_prefix(workspace_root).unwrap_or(path);
    relative.components().any(|component| {
        if let Component::Normal(name) = component {
            should_ignore(&name.to_string_lossy())
        } else {
            false
        }
    })
}
