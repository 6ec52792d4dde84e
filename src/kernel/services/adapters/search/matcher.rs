//! 分块模式匹配器
//!
//! - Text 模式：转义元字符，可选 `\b` 全词匹配
//! - Regex 模式：直接编译；查询末尾的 ` $N` 表示只报告第 N 个捕获组
//! - 按固定窗口扫描，相邻窗口保留一段重叠，跨边界的匹配不会丢失
//! - 行列号由游标增量推进，整个文件 O(n)

use super::pipeline::CancelSignal;
use crate::kernel::services::ports::search::{Match, MatchRange, SearchMode, SearchParams};
use crate::kernel::services::ports::settings::ChunkPolicy;
use regex::{Regex, RegexBuilder};

/// 编译好的查询，一次运行中所有文件共享
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    regex: Regex,
    group: Option<usize>,
}

impl CompiledQuery {
    /// 空查询或非法正则返回 None，调用方按零匹配处理
    pub fn compile(query: &str, params: &SearchParams) -> Option<Self> {
        if query.is_empty() {
            return None;
        }

        let (pattern, group) = match params.mode {
            SearchMode::Regex => {
                let (body, group) = split_group_suffix(query);
                (body.to_string(), group)
            }
            SearchMode::Text => {
                let escaped = regex::escape(query);
                if params.whole_word {
                    (format!(r"\b{}\b", escaped), None)
                } else {
                    (escaped, None)
                }
            }
        };
        if pattern.is_empty() {
            return None;
        }

        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(!params.match_case)
            .multi_line(true)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => {
                tracing::debug!(error = %e, "invalid search pattern");
                return None;
            }
        };

        if let Some(group) = group {
            if group >= regex.captures_len() {
                return None;
            }
        }

        Some(Self { regex, group })
    }
}

/// 拆出 `pattern $N` 形式的捕获组后缀
fn split_group_suffix(query: &str) -> (&str, Option<usize>) {
    let trimmed = query.trim_end();
    let Some(dollar) = trimmed.rfind('$') else {
        return (query, None);
    };
    let digits = &trimmed[dollar + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (query, None);
    }
    let body = &trimmed[..dollar];
    if !body.ends_with(char::is_whitespace) {
        return (query, None);
    }
    match digits.parse::<usize>() {
        Ok(group) => (body.trim_end(), Some(group)),
        Err(_) => (query, None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Yield,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Complete,
    Cancelled,
}

/// 行列游标：只前进，锚点停在上一个匹配的末尾
#[derive(Debug, Clone, Copy)]
struct LineCursor {
    offset: usize,
    line: usize,
    line_start: usize,
}

impl LineCursor {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn advance(&mut self, bytes: &[u8], target: usize) {
        if target < self.offset {
            *self = Self::new();
        }
        let segment = &bytes[self.offset..target];
        let newlines = memchr::memchr_iter(b'\n', segment).count();
        if newlines > 0 {
            self.line += newlines;
            if let Some(last) = memchr::memrchr(b'\n', segment) {
                self.line_start = self.offset + last + 1;
            }
        }
        self.offset = target;
    }

    fn column(&self) -> usize {
        self.offset - self.line_start
    }

    fn locate(&mut self, bytes: &[u8], start: usize, end: usize) -> MatchRange {
        self.advance(bytes, start);
        let (start_line, start_column) = (self.line, self.column());
        self.advance(bytes, end);
        MatchRange {
            start_line,
            start_column,
            end_line: self.line,
            end_column: self.column(),
        }
    }
}

/// 逐窗口推进的扫描器
///
/// `step` 最多产出 `budget` 个匹配或扫完当前窗口就返回 `Yield`，
/// 调用方借此让出执行权并检查取消。
pub struct ChunkScanner<'a> {
    content: &'a str,
    query: &'a CompiledQuery,
    policy: ChunkPolicy,
    window_start: usize,
    window_end: usize,
    next_window_start: usize,
    pos: usize,
    cursor: LineCursor,
    last: Option<(usize, usize)>,
    done: bool,
}

impl<'a> ChunkScanner<'a> {
    pub fn new(content: &'a str, query: &'a CompiledQuery, policy: ChunkPolicy) -> Self {
        let mut scanner = Self {
            content,
            query,
            policy,
            window_start: 0,
            window_end: 0,
            next_window_start: 0,
            pos: 0,
            cursor: LineCursor::new(),
            last: None,
            done: false,
        };
        if is_binary(content) {
            scanner.done = true;
        } else {
            scanner.open_window(0);
        }
        scanner
    }

    fn open_window(&mut self, start: usize) {
        let len = self.content.len();
        self.window_start = start;
        self.window_end = ceil_boundary(self.content, start.saturating_add(self.policy.chunk_size));
        self.next_window_start = if self.window_end >= len {
            len
        } else {
            let next = floor_boundary(self.content, self.window_end - self.policy.overlap);
            if next <= start {
                self.window_end
            } else {
                next
            }
        };
        self.pos = self.pos.max(start);
    }

    pub fn step(&mut self, out: &mut Vec<Match>, budget: usize) -> ScanStep {
        if self.done {
            return ScanStep::Done;
        }

        let content = self.content;
        let haystack = &content[..self.window_end];
        let final_window = self.window_end == content.len();
        let mut emitted = 0usize;

        while self.pos <= self.window_end {
            let Some(caps) = self.query.regex.captures_at(haystack, self.pos) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };

            // 伸进重叠区的匹配可能被窗口截短，从它的起点开窗重扫
            if !final_window
                && whole.end() > self.window_end - self.policy.overlap
                && whole.start() > self.window_start
            {
                self.next_window_start = self.next_window_start.min(whole.start());
                break;
            }

            self.pos = if whole.start() == whole.end() {
                next_boundary(content, whole.end())
            } else {
                whole.end()
            };

            let span = match self.query.group {
                Some(group) => caps.get(group),
                None => Some(whole),
            };
            let Some(span) = span.filter(|m| m.start() < m.end()) else {
                continue;
            };

            // 重叠区产生的重复匹配
            let identity = (span.start(), span.end());
            if self.last == Some(identity) {
                continue;
            }
            self.last = Some(identity);

            let range = self
                .cursor
                .locate(content.as_bytes(), span.start(), span.end());
            out.push(Match::new(span.start(), span.end(), range, span.as_str()));

            emitted += 1;
            if emitted >= budget {
                return ScanStep::Yield;
            }
        }

        if final_window {
            self.done = true;
            return ScanStep::Done;
        }

        let next = self.next_window_start;
        self.open_window(next);
        ScanStep::Yield
    }
}

/// 异步扫描：窗口之间和每 `yield_every` 个匹配让出一次，每个让出点检查取消。
/// 被取消时已找到的匹配留在 `out` 中。
pub async fn scan(
    content: &str,
    query: &CompiledQuery,
    policy: ChunkPolicy,
    signal: &CancelSignal,
    out: &mut Vec<Match>,
) -> ScanStatus {
    let mut scanner = ChunkScanner::new(content, query, policy);
    loop {
        if signal.is_cancelled() {
            return ScanStatus::Cancelled;
        }
        match scanner.step(out, policy.yield_every) {
            ScanStep::Done => return ScanStatus::Complete,
            ScanStep::Yield => tokio::task::yield_now().await,
        }
    }
}

/// 同步扫描整个内容
pub fn find_all(content: &str, query: &CompiledQuery, policy: ChunkPolicy) -> Vec<Match> {
    let mut matches = Vec::new();
    let mut scanner = ChunkScanner::new(content, query, policy);
    while scanner.step(&mut matches, usize::MAX) == ScanStep::Yield {}
    matches
}

/// 编译并扫描；查询非法时返回空
pub fn find_matches(content: &str, query: &str, params: &SearchParams) -> Vec<Match> {
    match CompiledQuery::compile(query, params) {
        Some(compiled) => find_all(content, &compiled, ChunkPolicy::default()),
        None => Vec::new(),
    }
}

fn is_binary(content: &str) -> bool {
    memchr::memchr(0, content.as_bytes()).is_some()
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// 空匹配之后的下一个搜索起点；越过末尾时返回 len + 1
fn next_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        s.len() + 1
    } else {
        ceil_boundary(s, i + 1)
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/matcher.rs"]
mod tests;
