//! 防抖协调器
//!
//! 参数变化先进入通道，静默窗口结束后只用最后一次参数重启工作流。
//! 匹配大小写、全词或搜索模式变化时整个缓存失效。

use super::cache::SearchCache;
use super::events::EventHub;
use super::workflow::{SearchWorkflow, WorkflowState};
use crate::core::Service;
use crate::kernel::services::ports::file::FileLookup;
use crate::kernel::services::ports::search::{SearchEvent, SearchParams, SearchRequest};
use crate::kernel::services::ports::settings::SearchSettings;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

struct PendingUpdate {
    request: SearchRequest,
    generation: u64,
}

pub struct DebouncedSearch {
    workflow: Arc<SearchWorkflow>,
    tx: UnboundedSender<PendingUpdate>,
    /// `stop` 每调用一次加一；过期代数的更新不会触发运行
    generation: Arc<Mutex<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DebouncedSearch {
    pub fn new(
        runtime: tokio::runtime::Handle,
        lookup: Arc<dyn FileLookup>,
        settings: SearchSettings,
    ) -> Self {
        let cache = Arc::new(Mutex::new(SearchCache::new(settings.cache_max_size)));
        let hub = Arc::new(EventHub::new());
        let window = settings.debounce();
        let workflow = Arc::new(SearchWorkflow::new(
            runtime.clone(),
            lookup,
            settings,
            cache,
            hub,
        ));
        Self::with_workflow(runtime, workflow, window)
    }

    pub fn with_workflow(
        runtime: tokio::runtime::Handle,
        workflow: Arc<SearchWorkflow>,
        window: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(Mutex::new(0));
        runtime.spawn(debounce_loop(
            rx,
            workflow.clone(),
            generation.clone(),
            window,
        ));
        Self {
            workflow,
            tx,
            generation,
        }
    }

    /// 提交新参数；静默窗口内的多次提交只保留最后一次
    pub fn update(&self, request: SearchRequest) {
        let generation = *lock(&self.generation);
        if self.tx.send(PendingUpdate { request, generation }).is_err() {
            tracing::warn!("debounce loop is gone, update dropped");
        }
    }

    /// 停止活动运行，并丢弃尚未触发的更新
    pub fn stop(&self) {
        let mut generation = lock(&self.generation);
        *generation += 1;
        self.workflow.stop();
    }

    pub fn continue_search(&self) {
        self.workflow.continue_search();
    }

    pub fn scan_large_files(&self) {
        self.workflow.scan_large_files();
    }

    pub fn clear_all(&self) {
        self.workflow.clear_all();
    }

    pub fn remove_file(&self, file: &Path) {
        self.workflow.remove_file(file);
    }

    pub fn invalidate_file(&self, file: &Path) {
        self.workflow.invalidate_file(file);
    }

    pub fn subscribe(&self) -> Receiver<SearchEvent> {
        self.workflow.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        self.workflow.state()
    }

    pub fn workflow(&self) -> &Arc<SearchWorkflow> {
        &self.workflow
    }
}

impl Service for DebouncedSearch {
    fn name(&self) -> &'static str {
        "DebouncedSearch"
    }
}

async fn debounce_loop(
    mut rx: UnboundedReceiver<PendingUpdate>,
    workflow: Arc<SearchWorkflow>,
    generation: Arc<Mutex<u64>>,
    window: Duration,
) {
    let mut last_params: Option<SearchParams> = None;

    while let Some(first) = rx.recv().await {
        let mut pending = first;
        loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(next)) => pending = next,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let current = lock(&generation);
        if *current != pending.generation {
            tracing::debug!(query = %pending.request.query, "stale search update dropped");
            continue;
        }

        if last_params
            .as_ref()
            .is_some_and(|prev| prev.invalidates_offsets(&pending.request.params))
        {
            workflow.clear_all();
        }
        last_params = Some(pending.request.params.clone());
        workflow.run(pending.request);
        drop(current);
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/coordinator.rs"]
mod tests;
