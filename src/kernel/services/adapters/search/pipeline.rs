//! 有界并发的扫描流水线
//!
//! 最多 `concurrency` 个任务同时在途；调度下一个任务前先等待 `before_each`
//! （工作流用它实现暂停），每个调度点检查取消信号。

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

static RUN_ID: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> u64 {
    RUN_ID.fetch_add(1, Ordering::Relaxed)
}

/// 一次运行的取消信号，克隆后共享同一个标志
#[derive(Debug, Clone)]
pub struct CancelSignal {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            id: next_run_id(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Cancelled,
}

pub struct ScanPipeline {
    concurrency: usize,
}

impl ScanPipeline {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 对 `items` 逐个执行 `op`，全部结束或信号取消后返回。
    /// 取消后不再调度新任务，在途任务自行检查信号后退出，这里等它们收尾。
    pub async fn run<T, F, Fut, H, HFut>(
        &self,
        items: Vec<T>,
        op: F,
        signal: &CancelSignal,
        mut before_each: H,
    ) -> PipelineOutcome
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
        H: FnMut() -> HFut,
        HFut: Future<Output = ()>,
    {
        let mut in_flight = JoinSet::new();
        let mut pending = items.into_iter().peekable();

        'schedule: loop {
            while in_flight.len() < self.concurrency && pending.peek().is_some() {
                if signal.is_cancelled() {
                    break 'schedule;
                }
                before_each().await;
                if signal.is_cancelled() {
                    break 'schedule;
                }
                let Some(item) = pending.next() else {
                    break;
                };
                in_flight.spawn(op(item));
            }

            match in_flight.join_next().await {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "scan task failed");
                }
                None => break,
            }

            if signal.is_cancelled() {
                break;
            }
        }

        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "scan task failed");
            }
        }

        if signal.is_cancelled() {
            PipelineOutcome::Cancelled
        } else {
            PipelineOutcome::Completed
        }
    }
}

impl Default for ScanPipeline {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/pipeline.rs"]
mod tests;
