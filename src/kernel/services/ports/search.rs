use super::file::FileError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, SearchError>;

/// 文件身份：工作区内的绝对路径
pub type FileId = PathBuf;

#[derive(Debug)]
pub enum SearchError {
    Lookup(FileError),
    Task(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::Lookup(e) => write!(f, "File lookup failed: {}", e),
            SearchError::Task(msg) => write!(f, "Search task failed: {}", msg),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Lookup(e) => Some(e),
            SearchError::Task(_) => None,
        }
    }
}

impl From<FileError> for SearchError {
    fn from(e: FileError) -> Self {
        SearchError::Lookup(e)
    }
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(e: tokio::task::JoinError) -> Self {
        SearchError::Task(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Text,
    Regex,
}

/// 除查询串以外的全部搜索参数；缓存节点只有在参数完全相同时才可复用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SearchParams {
    pub match_case: bool,
    pub whole_word: bool,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub mode: SearchMode,
}

impl SearchParams {
    /// 改变这些参数会让之前所有匹配的偏移失效
    pub fn invalidates_offsets(&self, other: &SearchParams) -> bool {
        self.match_case != other.match_case
            || self.whole_word != other.whole_word
            || self.mode != other.mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub query: String,
    pub params: SearchParams,
    /// 在上一次全局搜索的结果中继续搜索
    pub within_results: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, params: SearchParams) -> Self {
        Self {
            query: query.into(),
            params,
            within_results: false,
        }
    }

    pub fn within_results(mut self) -> Self {
        self.within_results = true;
        self
    }
}

/// 行号从 1 开始，列是相对行首的字节偏移（从 0 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchRange {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub range: MatchRange,
    pub text: String,
}

impl Match {
    pub fn new(start: usize, end: usize, range: MatchRange, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            range,
            text: text.into(),
        }
    }
}

/// 单个文件的扫描结果；保留源文本，使偏移无需重新读取文件即可解释
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatchSet {
    pub file: FileId,
    pub source: Arc<str>,
    pub matches: Vec<Match>,
    pub error: Option<String>,
}

impl FileMatchSet {
    pub fn new(file: FileId, source: Arc<str>, matches: Vec<Match>) -> Self {
        Self {
            file,
            source,
            matches,
            error: None,
        }
    }

    pub fn failed(file: FileId, error: impl Into<String>) -> Self {
        Self {
            file,
            source: Arc::from(""),
            matches: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    Started {
        run_id: u64,
    },
    Progress {
        run_id: u64,
        completed: usize,
        total: usize,
    },
    Result {
        run_id: u64,
        result: FileMatchSet,
    },
    Paused {
        run_id: u64,
        limit: usize,
        count: usize,
    },
    SkippedLargeFiles {
        run_id: u64,
        count: usize,
    },
    Done {
        run_id: u64,
    },
    Stopped {
        run_id: u64,
    },
    Error {
        run_id: u64,
        message: String,
    },
}

impl SearchEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            SearchEvent::Started { run_id }
            | SearchEvent::Progress { run_id, .. }
            | SearchEvent::Result { run_id, .. }
            | SearchEvent::Paused { run_id, .. }
            | SearchEvent::SkippedLargeFiles { run_id, .. }
            | SearchEvent::Done { run_id }
            | SearchEvent::Stopped { run_id }
            | SearchEvent::Error { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/ports/search.rs"]
mod tests;
