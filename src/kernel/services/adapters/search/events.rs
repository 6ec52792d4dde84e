//! 搜索事件分发
//!
//! 每个订阅者一个 `mpsc` 通道；接收端被丢弃后下一次 `emit` 时自动移除。

use crate::kernel::services::ports::search::SearchEvent;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<SearchEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SearchEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: SearchEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<SearchEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
