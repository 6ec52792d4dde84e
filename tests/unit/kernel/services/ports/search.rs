use super::*;
use std::error::Error as _;

#[test]
fn test_search_error_display_and_source() {
    let err = SearchError::from(FileError::InvalidPattern("[".to_string()));
    assert_eq!(
        err.to_string(),
        "File lookup failed: Invalid file pattern: ["
    );
    assert!(err.source().is_some());

    let err = SearchError::Task("boom".to_string());
    assert_eq!(err.to_string(), "Search task failed: boom");
    assert!(err.source().is_none());
}

#[test]
fn test_params_offset_invalidation() {
    let base = SearchParams::default();

    let mut include_changed = base.clone();
    include_changed.include = Some("*.rs".to_string());
    assert!(!base.invalidates_offsets(&include_changed));

    let mut case_changed = base.clone();
    case_changed.match_case = true;
    assert!(base.invalidates_offsets(&case_changed));

    let mut mode_changed = base.clone();
    mode_changed.mode = SearchMode::Regex;
    assert!(base.invalidates_offsets(&mode_changed));
}

#[test]
fn test_search_mode_serde() {
    assert_eq!(serde_json::to_string(&SearchMode::Regex).unwrap(), "\"regex\"");
    let mode: SearchMode = serde_json::from_str("\"text\"").unwrap();
    assert_eq!(mode, SearchMode::Text);
}

#[test]
fn test_request_builder() {
    let request = SearchRequest::new("needle", SearchParams::default());
    assert!(!request.within_results);
    assert!(request.within_results().within_results);
}

#[test]
fn test_failed_match_set() {
    let set = FileMatchSet::failed(PathBuf::from("/ws/a.txt"), "denied");
    assert!(!set.has_matches());
    assert_eq!(set.error.as_deref(), Some("denied"));
    assert!(set.source.is_empty());
}

#[test]
fn test_event_run_id() {
    let events = [
        SearchEvent::Started { run_id: 3 },
        SearchEvent::Progress {
            run_id: 3,
            completed: 1,
            total: 2,
        },
        SearchEvent::Paused {
            run_id: 3,
            limit: 5,
            count: 6,
        },
        SearchEvent::Error {
            run_id: 3,
            message: String::new(),
        },
    ];
    assert!(events.iter().all(|e| e.run_id() == 3));
}
