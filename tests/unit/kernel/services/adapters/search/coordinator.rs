use super::*;
use crate::kernel::services::ports::file::{FileError, ReadOptions, Result as FileResult};
use crate::kernel::services::ports::search::FileId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

struct StaticLookup {
    files: BTreeMap<PathBuf, String>,
    finds: AtomicUsize,
}

impl StaticLookup {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, text)| (PathBuf::from("/ws").join(name), text.to_string()))
                .collect(),
            finds: AtomicUsize::new(0),
        }
    }
}

impl FileLookup for StaticLookup {
    fn find_files(&self, _include: Option<&str>, _exclude: Option<&str>) -> FileResult<Vec<FileId>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.keys().cloned().collect())
    }

    fn read_file(&self, file: &Path, _options: ReadOptions) -> FileResult<String> {
        self.files
            .get(file)
            .cloned()
            .ok_or_else(|| FileError::NotFound(file.to_path_buf()))
    }
}

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn coordinator(rt: &tokio::runtime::Runtime, lookup: Arc<StaticLookup>) -> DebouncedSearch {
    let settings = SearchSettings {
        concurrency: 1,
        ..SearchSettings::default()
    };
    let workflow = Arc::new(SearchWorkflow::new(
        rt.handle().clone(),
        lookup,
        settings,
        Arc::new(Mutex::new(SearchCache::new(20))),
        Arc::new(EventHub::new()),
    ));
    DebouncedSearch::with_workflow(rt.handle().clone(), workflow, Duration::from_millis(100))
}

fn until_done(rx: &Receiver<SearchEvent>) -> Vec<SearchEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("timed out waiting for search event");
        let done = matches!(event, SearchEvent::Done { .. } | SearchEvent::Error { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

fn match_count(events: &[SearchEvent]) -> usize {
    events
        .iter()
        .filter_map(|e| match e {
            SearchEvent::Result { result, .. } => Some(result.matches.len()),
            _ => None,
        })
        .sum()
}

#[test]
fn test_burst_of_updates_runs_once() {
    let rt = create_runtime();
    let lookup = Arc::new(StaticLookup::new(&[("a.txt", "needle nest")]));
    let search = coordinator(&rt, lookup.clone());
    let rx = search.subscribe();

    for query in ["n", "ne", "nee", "needle"] {
        search.update(SearchRequest::new(query, SearchParams::default()));
    }
    let events = until_done(&rx);

    let started = events
        .iter()
        .filter(|e| matches!(e, SearchEvent::Started { .. }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(match_count(&events), 1);
    assert_eq!(lookup.finds.load(Ordering::SeqCst), 1);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn test_stop_discards_pending_update() {
    let rt = create_runtime();
    let lookup = Arc::new(StaticLookup::new(&[("a.txt", "needle")]));
    let search = coordinator(&rt, lookup.clone());
    let rx = search.subscribe();

    search.update(SearchRequest::new("needle", SearchParams::default()));
    search.stop();

    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    assert_eq!(search.state(), WorkflowState::Idle);
    assert_eq!(lookup.finds.load(Ordering::SeqCst), 0);

    // 之后的更新照常触发
    search.update(SearchRequest::new("needle", SearchParams::default()));
    let events = until_done(&rx);
    assert_eq!(match_count(&events), 1);
}

#[test]
fn test_param_change_restarts_with_new_params() {
    let rt = create_runtime();
    let lookup = Arc::new(StaticLookup::new(&[("a.txt", "Needle needle")]));
    let search = coordinator(&rt, lookup);
    let rx = search.subscribe();

    search.update(SearchRequest::new("needle", SearchParams::default()));
    assert_eq!(match_count(&until_done(&rx)), 2);

    let case = SearchParams {
        match_case: true,
        ..SearchParams::default()
    };
    search.update(SearchRequest::new("needle", case.clone()));
    assert_eq!(match_count(&until_done(&rx)), 1);

    let cache = lock(search.workflow().cache());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.current_node().map(|n| n.params.clone()), Some(case));
}

#[test]
fn test_controls_pass_through_to_workflow() {
    let rt = create_runtime();
    let lookup = Arc::new(StaticLookup::new(&[("a.txt", "needle")]));
    let search = coordinator(&rt, lookup);
    let rx = search.subscribe();

    search.update(SearchRequest::new("needle", SearchParams::default()));
    until_done(&rx);
    assert_eq!(search.state(), WorkflowState::Done);
    assert_eq!(search.name(), "DebouncedSearch");

    search.invalidate_file(Path::new("/ws/a.txt"));
    assert!(!lock(search.workflow().cache())
        .current_node()
        .is_some_and(|n| n.is_complete));

    search.clear_all();
    assert!(lock(search.workflow().cache()).is_empty());
}
