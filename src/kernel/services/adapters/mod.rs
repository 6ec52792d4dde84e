//! Service adapters: OS/runtime specific implementations (IO/async).

pub mod dirs;
pub mod file;
pub mod file_watcher;
pub mod search;
pub mod settings;

pub use dirs::{ensure_log_dir, get_app_data_dir, get_log_dir};
pub use file::LocalFileLookup;
pub use file_watcher::{apply_changes, classify, FileChange, WorkspaceWatcher};
pub use search::{
    find_matches, CancelSignal, CompiledQuery, DebouncedSearch, EventHub, NodeId, ScanPipeline,
    SearchCache, SearchWorkflow, WorkflowState,
};
pub use settings::{ensure_settings_file, get_settings_path, load_settings};
