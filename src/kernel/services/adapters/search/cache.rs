//! 增量搜索缓存
//!
//! 以前缀关系组织的搜索树：全局节点的查询串总是以父节点的查询串开头，细化节点挂在它所细化的节点下。
//! 节点放在 SlotMap 里，父子关系只存 `NodeId`，淘汰节点就是一次删除。

use crate::kernel::services::ports::search::{FileId, FileMatchSet, SearchParams};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

new_key_type! { pub struct NodeId; }

pub const DEFAULT_MAX_SIZE: usize = 20;

/// 一次已执行（或进行中）的搜索
#[derive(Debug, Clone)]
pub struct CacheNode {
    pub query: String,
    pub params: SearchParams,
    pub is_global: bool,
    pub depth: usize,
    pub results: FxHashMap<FileId, FileMatchSet>,
    pub processed: FxHashSet<FileId>,
    pub excluded: FxHashSet<FileId>,
    pub is_complete: bool,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<String, NodeId>, // 按查询串索引，保持有序
}

impl CacheNode {
    fn new(query: String, params: SearchParams, is_global: bool, parent: Option<(NodeId, usize)>) -> Self {
        Self {
            query,
            params,
            is_global,
            depth: parent.map(|(_, depth)| depth + 1).unwrap_or(0),
            results: FxHashMap::default(),
            processed: FxHashSet::default(),
            excluded: FxHashSet::default(),
            is_complete: false,
            parent: parent.map(|(id, _)| id),
            children: BTreeMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// 该节点能否作为 `query` 的起点
    pub fn is_compatible(&self, query: &str, params: &SearchParams, require_global: bool) -> bool {
        query.starts_with(self.query.as_str())
            && self.params == *params
            && (!require_global || self.is_global)
    }

    pub fn match_count(&self) -> usize {
        self.results.values().map(|r| r.matches.len()).sum()
    }
}

pub struct SearchCache {
    nodes: SlotMap<NodeId, CacheNode>,
    root: Option<NodeId>,
    current: Option<NodeId>,
    max_size: usize,
}

impl SearchCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            current: None,
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn set_current(&mut self, id: NodeId) {
        if self.nodes.contains_key(id) {
            self.current = Some(id);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&CacheNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn current_node(&self) -> Option<&CacheNode> {
        self.current.and_then(|id| self.nodes.get(id))
    }

    /// 先看当前节点及其直接子节点，再从根做 BFS 找最长的兼容前缀
    pub fn find_compatible_node(
        &self,
        query: &str,
        params: &SearchParams,
        require_global: bool,
    ) -> Option<NodeId> {
        if let Some(current) = self.current.and_then(|id| self.nodes.get(id).map(|n| (id, n))) {
            let (current_id, current_node) = current;
            let near = current_node
                .children
                .values()
                .copied()
                .chain(std::iter::once(current_id));
            if let Some(found) =
                longest_compatible(&self.nodes, near, query, params, require_global)
            {
                return Some(found);
            }
        }

        let root = self.root?;
        longest_compatible(
            &self.nodes,
            breadth_first(&self.nodes, root),
            query,
            params,
            require_global,
        )
    }

    /// 查询串和参数完全相同的节点。
    ///
    /// `scope` 为 None 时只找全局节点；否则只找最近全局祖先为 `scope` 的细化节点。
    pub fn find_exact(
        &self,
        query: &str,
        params: &SearchParams,
        scope: Option<NodeId>,
    ) -> Option<NodeId> {
        let root = self.root?;
        breadth_first(&self.nodes, root).into_iter().find(|&id| {
            let node = &self.nodes[id];
            if node.query != query || node.params != *params {
                return false;
            }
            match scope {
                None => node.is_global,
                Some(scope) => !node.is_global && self.nearest_global_ancestor(id) == Some(scope),
            }
        })
    }

    /// 新建节点并设为当前节点。
    ///
    /// 父节点优先取 `explicit_parent`（细化搜索挂在它所细化的节点下，不要求前缀关系），
    /// 否则查找兼容节点；都没有时新节点成为根，整棵旧树被替换。新节点的结果集总是空的。
    pub fn create_node(
        &mut self,
        query: &str,
        params: &SearchParams,
        require_global: bool,
        explicit_parent: Option<NodeId>,
    ) -> NodeId {
        let parent = explicit_parent
            .filter(|&id| self.nodes.contains_key(id))
            .or_else(|| self.find_compatible_node(query, params, require_global));

        let id = match parent {
            Some(parent_id) => {
                let parent_depth = self.nodes[parent_id].depth;
                let node = CacheNode::new(
                    query.to_string(),
                    params.clone(),
                    require_global,
                    Some((parent_id, parent_depth)),
                );
                let id = self.nodes.insert(node);
                let replaced = self.nodes[parent_id]
                    .children
                    .insert(query.to_string(), id);
                if let Some(old) = replaced {
                    self.remove_subtree(old);
                }
                id
            }
            None => {
                if !self.nodes.is_empty() {
                    tracing::debug!(nodes = self.nodes.len(), "search cache root replaced");
                }
                self.nodes.clear();
                let id = self.nodes.insert(CacheNode::new(
                    query.to_string(),
                    params.clone(),
                    require_global,
                    None,
                ));
                self.root = Some(id);
                id
            }
        };

        self.current = Some(id);
        self.evict(id);
        id
    }

    /// 记录一个文件的扫描结果；对同一文件重复调用结果不变
    pub fn add_result(&mut self, id: NodeId, file: FileId, result: FileMatchSet) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if result.has_matches() {
            node.excluded.remove(&file);
            node.results.insert(file.clone(), result);
        } else {
            node.results.remove(&file);
            node.excluded.insert(file.clone());
        }
        node.processed.insert(file);
    }

    pub fn mark_complete(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.is_complete = true;
        }
    }

    pub fn should_process(&self, id: NodeId, file: &Path) -> bool {
        match self.nodes.get(id) {
            Some(node) => !node.processed.contains(file) && !node.excluded.contains(file),
            None => true,
        }
    }

    /// 文件被删除：从所有节点中清除
    pub fn remove_file(&mut self, file: &Path) {
        for node in self.nodes.values_mut() {
            node.results.remove(file);
            node.processed.remove(file);
            node.excluded.remove(file);
        }
    }

    /// 文件被修改：强制重新扫描，但保留已有结果，使其仍处于嵌套搜索的范围内。
    /// 全局节点总是变为未完成，新建的文件也会在下一次运行中被扫描。
    pub fn invalidate_file(&mut self, file: &Path) {
        for node in self.nodes.values_mut() {
            let was_processed = node.processed.remove(file);
            let was_excluded = node.excluded.remove(file);
            if node.is_global || was_processed || was_excluded || node.results.contains_key(file) {
                node.is_complete = false;
            }
        }
    }

    /// 沿父链向上找到第一个全局节点（含起点自身）
    pub fn nearest_global_ancestor(&self, start: NodeId) -> Option<NodeId> {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let node = self.nodes.get(id)?;
            if node.is_global {
                return Some(id);
            }
            cursor = node.parent;
        }
        None
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.current = None;
    }

    /// 超出容量时按先序遍历淘汰第一个叶子节点，`keep` 不参与淘汰。
    /// 整棵树只剩一条通向 `keep` 的链时，从链头开始丢弃。
    fn evict(&mut self, keep: NodeId) {
        while self.nodes.len() > self.max_size {
            let Some(root) = self.root else {
                break;
            };
            let victim = pre_order(&self.nodes, root)
                .into_iter()
                .find(|&id| id != keep && self.nodes[id].is_leaf());
            match victim {
                Some(victim) => {
                    tracing::debug!(query = %self.nodes[victim].query, "search cache node evicted");
                    self.remove_subtree(victim);
                }
                None => {
                    if !self.drop_root(keep) {
                        break;
                    }
                }
            }
        }
    }

    /// 删除只有一个子节点的根，子节点升为新根，子树深度整体减一
    fn drop_root(&mut self, keep: NodeId) -> bool {
        let Some(root) = self.root.filter(|&root| root != keep) else {
            return false;
        };
        let child = {
            let node = &self.nodes[root];
            if node.children.len() != 1 {
                return false;
            }
            node.children.values().next().copied()
        };
        let Some(child) = child else {
            return false;
        };

        if let Some(removed) = self.nodes.remove(root) {
            tracing::debug!(query = %removed.query, "search cache root evicted");
        }
        if self.current == Some(root) {
            self.current = None;
        }
        self.nodes[child].parent = None;
        self.root = Some(child);
        for id in pre_order(&self.nodes, child) {
            let node = &mut self.nodes[id];
            node.depth = node.depth.saturating_sub(1);
        }
        true
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if let Some(parent) = node.parent {
            let query = node.query.clone();
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                if parent_node.children.get(&query) == Some(&id) {
                    parent_node.children.remove(&query);
                }
            }
        }

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(removed) = self.nodes.remove(next) {
                stack.extend(removed.children.into_values());
            }
        }

        if self.root.is_some_and(|root| !self.nodes.contains_key(root)) {
            self.root = None;
        }
        if self.current.is_some_and(|cur| !self.nodes.contains_key(cur)) {
            self.current = None;
        }
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

/// 候选节点中查询串最长的兼容节点；长度相同时取先遇到的
pub fn longest_compatible<I>(
    nodes: &SlotMap<NodeId, CacheNode>,
    candidates: I,
    query: &str,
    params: &SearchParams,
    require_global: bool,
) -> Option<NodeId>
where
    I: IntoIterator<Item = NodeId>,
{
    let mut best: Option<(NodeId, usize)> = None;
    for id in candidates {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        if !node.is_compatible(query, params, require_global) {
            continue;
        }
        let len = node.query.len();
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((id, len));
        }
    }
    best.map(|(id, _)| id)
}

pub fn breadth_first(nodes: &SlotMap<NodeId, CacheNode>, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        order.push(id);
        queue.extend(node.children.values().copied());
    }
    order
}

pub fn pre_order(nodes: &SlotMap<NodeId, CacheNode>, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        order.push(id);
        stack.extend(node.children.values().rev().copied());
    }
    order
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/cache.rs"]
mod tests;
