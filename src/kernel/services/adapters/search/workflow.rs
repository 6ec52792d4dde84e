//! 搜索工作流
//!
//! 状态机：`Idle → Running → {Paused ⇄ Running} → Done | Stopped | Errored`。
//!
//! 一次运行分三步：确定候选文件（全量枚举，或在最近的全局节点结果中细化），
//! 挂载/复用缓存节点，再用扫描流水线处理尚未扫描过的文件。
//! 同一时刻只有一个活动运行；新运行会先取消旧运行。

use super::cache::{NodeId, SearchCache};
use super::events::EventHub;
use super::matcher::{scan, CompiledQuery, ScanStatus};
use super::pipeline::{CancelSignal, PipelineOutcome, ScanPipeline};
use crate::core::Service;
use crate::kernel::services::ports::file::{FileLookup, ReadOptions};
use crate::kernel::services::ports::search::{
    FileId, FileMatchSet, SearchError, SearchEvent, SearchRequest,
};
use crate::kernel::services::ports::settings::{ChunkPolicy, SearchSettings};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Running,
    Paused,
    Done,
    Stopped,
    Errored,
}

impl WorkflowState {
    pub fn is_active(self) -> bool {
        matches!(self, WorkflowState::Running | WorkflowState::Paused)
    }
}

/// 最近一次运行的控制句柄
#[derive(Clone)]
struct RunHandle {
    signal: CancelSignal,
    gate: Arc<watch::Sender<bool>>,
    node: Option<NodeId>,
    query: Option<Arc<CompiledQuery>>,
    had_errors: bool,
}

struct RunControl {
    state: WorkflowState,
    run: Option<RunHandle>,
    skipped_large: Vec<FileId>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SearchWorkflow {
    runtime: tokio::runtime::Handle,
    lookup: Arc<dyn FileLookup>,
    settings: SearchSettings,
    cache: Arc<Mutex<SearchCache>>,
    hub: Arc<EventHub>,
    control: Arc<Mutex<RunControl>>,
}

impl SearchWorkflow {
    pub fn new(
        runtime: tokio::runtime::Handle,
        lookup: Arc<dyn FileLookup>,
        settings: SearchSettings,
        cache: Arc<Mutex<SearchCache>>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            runtime,
            lookup,
            settings,
            cache,
            hub,
            control: Arc::new(Mutex::new(RunControl {
                state: WorkflowState::Idle,
                run: None,
                skipped_large: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> WorkflowState {
        lock(&self.control).state
    }

    pub fn current_run_id(&self) -> Option<u64> {
        lock(&self.control).run.as_ref().map(|run| run.signal.id())
    }

    pub fn skipped_large_files(&self) -> Vec<FileId> {
        lock(&self.control).skipped_large.clone()
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<Mutex<SearchCache>> {
        &self.cache
    }

    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<SearchEvent> {
        self.hub.subscribe()
    }

    /// 启动一次新运行并返回其 id；旧运行先被停止
    pub fn run(&self, request: SearchRequest) -> u64 {
        let signal = CancelSignal::new();
        let run_id = signal.id();
        let (gate, _) = watch::channel(true);
        let gate = Arc::new(gate);
        let query = CompiledQuery::compile(&request.query, &request.params).map(Arc::new);

        {
            let mut control = lock(&self.control);
            stop_locked(&mut control, &self.hub);
            control.state = WorkflowState::Running;
            control.skipped_large.clear();
            control.run = Some(RunHandle {
                signal: signal.clone(),
                gate: gate.clone(),
                node: None,
                query: query.clone(),
                had_errors: false,
            });
            self.hub.emit(SearchEvent::Started { run_id });
        }

        tracing::info!(
            run_id,
            query = %request.query,
            within_results = request.within_results,
            "search run started"
        );

        let setup = RunSetup {
            signal,
            gate,
            query,
            request,
            lookup: self.lookup.clone(),
            cache: self.cache.clone(),
            hub: self.hub.clone(),
            control: self.control.clone(),
            policy: self.settings.chunk_policy(),
            thresholds: self.settings.pause_thresholds(),
            concurrency: self.settings.concurrency(),
        };
        self.runtime.spawn(setup.execute());

        run_id
    }

    /// 停止活动运行；只有 Running/Paused 时才发出 Stopped
    pub fn stop(&self) {
        let mut control = lock(&self.control);
        stop_locked(&mut control, &self.hub);
    }

    /// 从暂停中恢复
    pub fn continue_search(&self) {
        let mut control = lock(&self.control);
        if control.state != WorkflowState::Paused {
            return;
        }
        control.state = WorkflowState::Running;
        if let Some(run) = &control.run {
            run.gate.send_replace(true);
            tracing::info!(run_id = run.signal.id(), "search resumed");
        }
    }

    /// 以不限大小的方式补扫上一次运行跳过的超大文件，结果照常写入缓存。
    /// 只在上一次运行正常结束后生效。
    pub fn scan_large_files(&self) {
        let (run, files) = {
            let mut control = lock(&self.control);
            if control.state != WorkflowState::Done || control.skipped_large.is_empty() {
                tracing::debug!(state = ?control.state, "no large files to scan");
                return;
            }
            let Some(run) = control.run.clone() else {
                return;
            };
            let Some(node) = run.node else {
                return;
            };
            let files = std::mem::take(&mut control.skipped_large);
            control.state = WorkflowState::Running;
            (
                Arc::new(ScanRun {
                    signal: run.signal.clone(),
                    gate: run.gate.clone(),
                    lookup: self.lookup.clone(),
                    cache: self.cache.clone(),
                    hub: self.hub.clone(),
                    control: self.control.clone(),
                    query: run.query.clone(),
                    policy: self.settings.chunk_policy(),
                    read_options: ReadOptions {
                        ignore_size_limit: true,
                    },
                    node,
                    thresholds: Vec::new(),
                    next_threshold: AtomicUsize::new(0),
                    total: files.len(),
                    completed: AtomicUsize::new(0),
                    match_count: AtomicUsize::new(0),
                    errors: AtomicUsize::new(0),
                    skipped: AtomicUsize::new(0),
                }),
                files,
            )
        };

        tracing::info!(run_id = run.signal.id(), files = files.len(), "scanning large files");
        let pipeline = ScanPipeline::new(self.settings.concurrency());
        self.runtime.spawn(run.execute(files, pipeline));
    }

    /// 停止活动运行并清空整个缓存
    pub fn clear_all(&self) {
        {
            let mut control = lock(&self.control);
            stop_locked(&mut control, &self.hub);
            control.skipped_large.clear();
        }
        lock(&self.cache).clear();
        tracing::debug!("search cache cleared");
    }

    pub fn remove_file(&self, file: &Path) {
        lock(&self.control).skipped_large.retain(|f| f != file);
        lock(&self.cache).remove_file(file);
    }

    pub fn invalidate_file(&self, file: &Path) {
        lock(&self.cache).invalidate_file(file);
    }
}

impl Drop for SearchWorkflow {
    fn drop(&mut self) {
        if let Some(run) = &lock(&self.control).run {
            run.signal.cancel();
            run.gate.send_replace(true);
        }
    }
}

impl Service for SearchWorkflow {
    fn name(&self) -> &'static str {
        "SearchWorkflow"
    }
}

fn stop_locked(control: &mut RunControl, hub: &EventHub) {
    let Some(run) = &control.run else {
        return;
    };
    run.signal.cancel();
    run.gate.send_replace(true);
    if control.state.is_active() {
        let run_id = run.signal.id();
        control.state = WorkflowState::Stopped;
        hub.emit(SearchEvent::Stopped { run_id });
        tracing::info!(run_id, "search run stopped");
    }
}

/// 运行开始前的准备：候选文件解析和缓存节点挂载
struct RunSetup {
    signal: CancelSignal,
    gate: Arc<watch::Sender<bool>>,
    query: Option<Arc<CompiledQuery>>,
    request: SearchRequest,
    lookup: Arc<dyn FileLookup>,
    cache: Arc<Mutex<SearchCache>>,
    hub: Arc<EventHub>,
    control: Arc<Mutex<RunControl>>,
    policy: ChunkPolicy,
    thresholds: Vec<usize>,
    concurrency: usize,
}

enum NodePlan {
    /// 完全相同且已完成的节点：直接回放
    Replay(Vec<FileMatchSet>),
    Scan {
        node: NodeId,
        cached: Vec<FileMatchSet>,
        pending: Vec<FileId>,
        resolved: usize,
    },
}

impl RunSetup {
    async fn execute(self) {
        let run_id = self.signal.id();

        let Some(query) = self.query.clone() else {
            tracing::debug!(run_id, query = %self.request.query, "empty or invalid query");
            self.finish_without_scan(0);
            return;
        };

        let (candidates, scope) = match self.resolve_candidates().await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        if self.signal.is_cancelled() {
            return;
        }

        tracing::debug!(
            run_id,
            files = candidates.len(),
            refine = scope.is_some(),
            "candidates resolved"
        );

        let total = candidates.len();
        let (node, cached, pending, resolved) = match self.plan_node(candidates, scope) {
            NodePlan::Replay(results) => {
                if !self.replay(&results) {
                    return;
                }
                self.finish_without_scan(total);
                return;
            }
            NodePlan::Scan {
                node,
                cached,
                pending,
                resolved,
            } => (node, cached, pending, resolved),
        };

        {
            let mut control = lock(&self.control);
            if self.signal.is_cancelled() {
                return;
            }
            if let Some(run) = control.run.as_mut() {
                run.node = Some(node);
            }
        }

        if !self.replay(&cached) {
            return;
        }

        let replayed_matches = cached.iter().map(|r| r.matches.len()).sum();
        let run = Arc::new(ScanRun {
            signal: self.signal.clone(),
            gate: self.gate.clone(),
            lookup: self.lookup.clone(),
            cache: self.cache.clone(),
            hub: self.hub.clone(),
            control: self.control.clone(),
            query: Some(query),
            policy: self.policy,
            read_options: ReadOptions::default(),
            node,
            thresholds: self.thresholds.clone(),
            next_threshold: AtomicUsize::new(0),
            total,
            completed: AtomicUsize::new(resolved),
            match_count: AtomicUsize::new(replayed_matches),
            errors: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        });
        run.emit(SearchEvent::Progress {
            run_id,
            completed: resolved,
            total,
        });

        let pipeline = ScanPipeline::new(self.concurrency);
        run.execute(pending, pipeline).await;
    }

    /// 细化搜索取最近全局祖先的结果集（同时返回该祖先），否则全量枚举
    async fn resolve_candidates(&self) -> Result<(Vec<FileId>, Option<NodeId>), SearchError> {
        if self.request.within_results {
            let cache = lock(&self.cache);
            let scope = cache
                .current()
                .and_then(|current| cache.nearest_global_ancestor(current));
            if let Some((id, node)) = scope.and_then(|id| cache.node(id).map(|n| (id, n))) {
                let mut files: Vec<FileId> = node.results.keys().cloned().collect();
                files.sort();
                return Ok((files, Some(id)));
            }
            tracing::debug!("no global search to refine, enumerating workspace");
        }

        let lookup = self.lookup.clone();
        let include = self.request.params.include.clone();
        let exclude = self.request.params.exclude.clone();
        let files = tokio::task::spawn_blocking(move || {
            lookup.find_files(include.as_deref(), exclude.as_deref())
        })
        .await??;
        Ok((files, None))
    }

    fn plan_node(&self, candidates: Vec<FileId>, scope: Option<NodeId>) -> NodePlan {
        let query = self.request.query.as_str();
        let params = &self.request.params;
        let mut cache = lock(&self.cache);

        if let Some(id) = cache.find_exact(query, params, scope) {
            cache.set_current(id);
            if let Some(node) = cache.node(id) {
                if node.is_complete {
                    let mut results: Vec<FileMatchSet> = node.results.values().cloned().collect();
                    results.sort_by(|a, b| a.file.cmp(&b.file));
                    return NodePlan::Replay(results);
                }

                let total = candidates.len();
                let mut cached = Vec::new();
                let mut pending = Vec::new();
                for file in candidates {
                    if cache.should_process(id, &file) {
                        pending.push(file);
                    } else if let Some(result) = node.results.get(&file) {
                        cached.push(result.clone());
                    }
                }
                let resolved = total - pending.len();
                return NodePlan::Scan {
                    node: id,
                    cached,
                    pending,
                    resolved,
                };
            }
        }

        // 细化节点挂在当前细化节点（查询串是其延伸时）或作用域节点下
        let parent = scope.map(|scope| {
            cache
                .current()
                .filter(|&current| {
                    cache.node(current).is_some_and(|n| {
                        !n.is_global && query.starts_with(n.query.as_str())
                    }) && cache.nearest_global_ancestor(current) == Some(scope)
                })
                .unwrap_or(scope)
        });
        let node = cache.create_node(query, params, scope.is_none(), parent);
        NodePlan::Scan {
            node,
            cached: Vec::new(),
            pending: candidates,
            resolved: 0,
        }
    }

    /// 回放缓存结果；运行已被取消时返回 false
    fn replay(&self, results: &[FileMatchSet]) -> bool {
        let run_id = self.signal.id();
        let _control = lock(&self.control);
        if self.signal.is_cancelled() {
            return false;
        }
        for result in results {
            self.hub.emit(SearchEvent::Result {
                run_id,
                result: result.clone(),
            });
        }
        true
    }

    fn finish_without_scan(&self, total: usize) {
        let run_id = self.signal.id();
        let mut control = lock(&self.control);
        if self.signal.is_cancelled() {
            return;
        }
        control.state = WorkflowState::Done;
        self.hub.emit(SearchEvent::Progress {
            run_id,
            completed: total,
            total,
        });
        self.hub.emit(SearchEvent::Done { run_id });
        tracing::info!(run_id, files = total, "search run finished from cache");
    }

    fn fail(&self, error: SearchError) {
        let run_id = self.signal.id();
        let mut control = lock(&self.control);
        if self.signal.is_cancelled() {
            return;
        }
        tracing::error!(run_id, error = %error, "search run failed");
        control.state = WorkflowState::Errored;
        self.hub.emit(SearchEvent::Error {
            run_id,
            message: error.to_string(),
        });
    }
}

/// 一次扫描过程共享的上下文；流水线中的每个任务持有一份 `Arc`
struct ScanRun {
    signal: CancelSignal,
    gate: Arc<watch::Sender<bool>>,
    lookup: Arc<dyn FileLookup>,
    cache: Arc<Mutex<SearchCache>>,
    hub: Arc<EventHub>,
    control: Arc<Mutex<RunControl>>,
    query: Option<Arc<CompiledQuery>>,
    policy: ChunkPolicy,
    read_options: ReadOptions,
    node: NodeId,
    thresholds: Vec<usize>,
    next_threshold: AtomicUsize,
    total: usize,
    completed: AtomicUsize,
    match_count: AtomicUsize,
    errors: AtomicUsize,
    skipped: AtomicUsize,
}

impl ScanRun {
    async fn execute(self: Arc<Self>, files: Vec<FileId>, pipeline: ScanPipeline) {
        let scan_run = self.clone();
        let op = move |file: FileId| {
            let run = scan_run.clone();
            async move { run.scan_file(file).await }
        };
        let gate_run = self.clone();
        let before_each = move || {
            let run = gate_run.clone();
            async move { run.throttle().await }
        };

        let outcome = pipeline.run(files, op, &self.signal, before_each).await;
        if outcome == PipelineOutcome::Cancelled {
            tracing::debug!(run_id = self.signal.id(), "scan cancelled");
            return;
        }
        self.finish();
    }

    /// 发出事件；运行已被取消时丢弃
    fn emit(&self, event: SearchEvent) -> bool {
        let _control = lock(&self.control);
        if self.signal.is_cancelled() {
            return false;
        }
        self.hub.emit(event);
        true
    }

    async fn scan_file(self: Arc<Self>, file: FileId) {
        if self.signal.is_cancelled() {
            return;
        }
        let run_id = self.signal.id();

        let lookup = self.lookup.clone();
        let path = file.clone();
        let options = self.read_options;
        let read = tokio::task::spawn_blocking(move || lookup.read_file(&path, options)).await;
        if self.signal.is_cancelled() {
            return;
        }

        match read {
            Ok(Ok(text)) => {
                let source: Arc<str> = Arc::from(text);
                let mut matches = Vec::new();
                if let Some(query) = &self.query {
                    let status = scan(&source, query, self.policy, &self.signal, &mut matches).await;
                    if status == ScanStatus::Cancelled {
                        return;
                    }
                }

                let result = FileMatchSet::new(file.clone(), source, matches);
                let found = result.matches.len();
                {
                    let mut cache = lock(&self.cache);
                    if self.signal.is_cancelled() {
                        return;
                    }
                    cache.add_result(self.node, file, result.clone());
                }
                if found > 0 {
                    self.match_count.fetch_add(found, Ordering::Relaxed);
                    if !self.emit(SearchEvent::Result { run_id, result }) {
                        return;
                    }
                }
            }
            Ok(Err(e)) if e.is_too_large() => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                let mut control = lock(&self.control);
                if self.signal.is_cancelled() {
                    return;
                }
                control.skipped_large.push(file);
                self.hub.emit(SearchEvent::SkippedLargeFiles {
                    run_id,
                    count: control.skipped_large.len(),
                });
            }
            Ok(Err(e)) => {
                tracing::warn!(run_id, file = %file.display(), error = %e, "failed to read file");
                self.errors.fetch_add(1, Ordering::Relaxed);
                if !self.emit(SearchEvent::Result {
                    run_id,
                    result: FileMatchSet::failed(file, e.to_string()),
                }) {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(run_id, file = %file.display(), error = %e, "read task failed");
                self.errors.fetch_add(1, Ordering::Relaxed);
                if !self.emit(SearchEvent::Result {
                    run_id,
                    result: FileMatchSet::failed(file, SearchError::from(e).to_string()),
                }) {
                    return;
                }
            }
        }

        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(SearchEvent::Progress {
            run_id,
            completed,
            total: self.total,
        });
    }

    /// 调度下一个文件前调用：匹配数越过阈值时暂停，直到 `continue_search`
    async fn throttle(&self) {
        loop {
            let index = self.next_threshold.load(Ordering::Relaxed);
            let Some(&limit) = self.thresholds.get(index) else {
                return;
            };
            let count = self.match_count.load(Ordering::Relaxed);
            if count < limit {
                return;
            }
            self.next_threshold.store(index + 1, Ordering::Relaxed);
            if !self.pause(limit, count) {
                return;
            }

            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
            if self.signal.is_cancelled() {
                return;
            }
        }
    }

    fn pause(&self, limit: usize, count: usize) -> bool {
        let run_id = self.signal.id();
        let mut control = lock(&self.control);
        if self.signal.is_cancelled() {
            return false;
        }
        self.gate.send_replace(false);
        control.state = WorkflowState::Paused;
        self.hub.emit(SearchEvent::Paused {
            run_id,
            limit,
            count,
        });
        tracing::info!(run_id, limit, count, "search paused at match threshold");
        true
    }

    fn finish(&self) {
        let run_id = self.signal.id();
        let errors = self.errors.load(Ordering::Relaxed);
        let skipped = self.skipped.load(Ordering::Relaxed);

        let mut control = lock(&self.control);
        if self.signal.is_cancelled() {
            return;
        }
        let had_errors = match control.run.as_mut() {
            Some(run) if run.signal.id() == run_id => {
                run.had_errors |= errors > 0;
                run.had_errors
            }
            _ => errors > 0,
        };
        if skipped == 0 && !had_errors {
            lock(&self.cache).mark_complete(self.node);
        }

        control.state = WorkflowState::Done;
        self.hub.emit(SearchEvent::Done { run_id });
        tracing::info!(
            run_id,
            files = self.total,
            matches = self.match_count.load(Ordering::Relaxed),
            skipped_large = skipped,
            errors,
            "search run finished"
        );
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/workflow.rs"]
mod tests;
