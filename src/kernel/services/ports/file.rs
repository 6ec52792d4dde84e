use super::search::FileId;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, FileError>;

#[derive(Debug)]
pub enum FileError {
    NotFound(PathBuf),
    NotAFile(PathBuf),
    TooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },
    InvalidPattern(String),
    Io(io::Error),
}

impl FileError {
    pub fn is_too_large(&self) -> bool {
        matches!(self, FileError::TooLarge { .. })
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::NotFound(path) => write!(f, "File not found: {}", path.display()),
            FileError::NotAFile(path) => write!(f, "Not a file: {}", path.display()),
            FileError::TooLarge { path, size, limit } => write!(
                f,
                "File too large: {} ({} bytes, limit {})",
                path.display(),
                size,
                limit
            ),
            FileError::InvalidPattern(msg) => write!(f, "Invalid file pattern: {}", msg),
            FileError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        FileError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub ignore_size_limit: bool,
}

/// 外部文件查找/读取服务
///
/// 两个方法都是阻塞的，工作流在 `spawn_blocking` 中调用它们。
pub trait FileLookup: Send + Sync {
    fn find_files(&self, include: Option<&str>, exclude: Option<&str>) -> Result<Vec<FileId>>;

    fn read_file(&self, file: &Path, options: ReadOptions) -> Result<String>;
}
