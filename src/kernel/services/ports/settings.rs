use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_pause_thresholds")]
    pub pause_thresholds: Vec<usize>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_yield_every_matches")]
    pub yield_every_matches: usize,
}

fn default_concurrency() -> usize {
    4
}

fn default_pause_thresholds() -> Vec<usize> {
    vec![5_000, 10_000]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_cache_max_size() -> usize {
    20
}

fn default_chunk_size() -> usize {
    512 * 1024
}

fn default_chunk_overlap() -> usize {
    1024
}

fn default_yield_every_matches() -> usize {
    100
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pause_thresholds: default_pause_thresholds(),
            max_file_size: default_max_file_size(),
            debounce_ms: default_debounce_ms(),
            cache_max_size: default_cache_max_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            yield_every_matches: default_yield_every_matches(),
        }
    }
}

impl SearchSettings {
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// 阈值去重并升序排列，非正值丢弃
    pub fn pause_thresholds(&self) -> Vec<usize> {
        let mut thresholds: Vec<usize> = self
            .pause_thresholds
            .iter()
            .copied()
            .filter(|&t| t > 0)
            .collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        thresholds
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::new(self.chunk_size, self.chunk_overlap, self.yield_every_matches)
    }
}

/// 匹配器的分块策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
    pub overlap: usize,
    pub yield_every: usize,
}

impl ChunkPolicy {
    pub fn new(chunk_size: usize, overlap: usize, yield_every: usize) -> Self {
        let chunk_size = chunk_size.max(2);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size / 2),
            yield_every: yield_every.max(1),
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        SearchSettings::default().chunk_policy()
    }
}
