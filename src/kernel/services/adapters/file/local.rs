//! 本地工作区文件查找
//!
//! 实现 FileLookup trait：用 ignore crate 遍历工作区（跳过隐藏文件和 git 忽略的路径），
//! include/exclude 为逗号分隔的 glob 列表。

use crate::kernel::services::ports::file::{FileError, FileLookup, ReadOptions, Result};
use crate::kernel::services::ports::search::FileId;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct LocalFileLookup {
    root: PathBuf,
    max_file_size: u64,
}

impl LocalFileLookup {
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self {
            root,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn build_overrides(&self, include: Option<&str>, exclude: Option<&str>) -> Result<Override> {
        let mut builder = OverrideBuilder::new(&self.root);
        for glob in split_globs(include) {
            builder
                .add(glob)
                .map_err(|e| FileError::InvalidPattern(e.to_string()))?;
        }
        for glob in split_globs(exclude) {
            builder
                .add(&format!("!{}", glob))
                .map_err(|e| FileError::InvalidPattern(e.to_string()))?;
        }
        builder
            .build()
            .map_err(|e| FileError::InvalidPattern(e.to_string()))
    }
}

impl FileLookup for LocalFileLookup {
    fn find_files(&self, include: Option<&str>, exclude: Option<&str>) -> Result<Vec<FileId>> {
        if !self.root.is_dir() {
            return Err(FileError::NotFound(self.root.clone()));
        }
        let overrides = self.build_overrides(include, exclude)?;

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .overrides(overrides)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_some_and(|t| t.is_file()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(&self, file: &Path, options: ReadOptions) -> Result<String> {
        let metadata = fs::metadata(file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(file.to_path_buf()),
            _ => FileError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(FileError::NotAFile(file.to_path_buf()));
        }
        if !options.ignore_size_limit && metadata.len() > self.max_file_size {
            return Err(FileError::TooLarge {
                path: file.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        let bytes = fs::read(file)?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

fn split_globs(list: Option<&str>) -> impl Iterator<Item = &str> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|glob| !glob.is_empty())
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/file/local.rs"]
mod tests;
