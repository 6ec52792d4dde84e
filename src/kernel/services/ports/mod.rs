//! Service ports: traits + data contracts.

pub mod file;
pub mod search;
pub mod settings;

pub use file::{FileError, FileLookup, ReadOptions, Result as FileResult};
pub use search::{
    FileId, FileMatchSet, Match, MatchRange, SearchError, SearchEvent, SearchMode, SearchParams,
    SearchRequest,
};
pub use settings::{ChunkPolicy, SearchSettings};
