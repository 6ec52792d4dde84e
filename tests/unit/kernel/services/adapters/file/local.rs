use super::*;
use std::fs;
use tempfile::tempdir;

fn relative(lookup: &LocalFileLookup, files: &[FileId]) -> Vec<String> {
    files
        .iter()
        .map(|f| {
            f.strip_prefix(lookup.root())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

fn workspace() -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("target")).unwrap();
    fs::write(dir.path().join("README.md"), "# readme").unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(dir.path().join("src/lib.rs"), "pub mod a;").unwrap();
    fs::write(dir.path().join("target/out.rs"), "// generated").unwrap();
    fs::write(dir.path().join(".hidden"), "secret").unwrap();
    dir
}

#[test]
fn test_find_files_lists_sorted_visible_files() {
    let dir = workspace();
    let lookup = LocalFileLookup::new(dir.path());

    let files = lookup.find_files(None, None).unwrap();

    assert_eq!(
        relative(&lookup, &files),
        vec!["README.md", "src/lib.rs", "src/main.rs", "target/out.rs"]
    );
}

#[test]
fn test_include_and_exclude_globs() {
    let dir = workspace();
    let lookup = LocalFileLookup::new(dir.path());

    let files = lookup.find_files(Some("*.rs"), None).unwrap();
    assert_eq!(
        relative(&lookup, &files),
        vec!["src/lib.rs", "src/main.rs", "target/out.rs"]
    );

    let files = lookup.find_files(Some("*.rs, *.md"), Some("target")).unwrap();
    assert_eq!(
        relative(&lookup, &files),
        vec!["README.md", "src/lib.rs", "src/main.rs"]
    );

    let files = lookup.find_files(None, Some("main.rs,target")).unwrap();
    assert_eq!(relative(&lookup, &files), vec!["README.md", "src/lib.rs"]);
}

#[test]
fn test_gitignored_paths_are_skipped() {
    let dir = workspace();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
    let lookup = LocalFileLookup::new(dir.path());

    let files = lookup.find_files(None, None).unwrap();

    assert_eq!(
        relative(&lookup, &files),
        vec!["README.md", "src/lib.rs", "src/main.rs"]
    );
}

#[test]
fn test_invalid_glob_is_reported() {
    let dir = workspace();
    let lookup = LocalFileLookup::new(dir.path());

    let err = lookup.find_files(Some("src/[a"), None).unwrap_err();
    assert!(matches!(err, FileError::InvalidPattern(_)));
}

#[test]
fn test_missing_root_is_not_found() {
    let dir = tempdir().unwrap();
    let lookup = LocalFileLookup::new(&dir.path().join("nope"));

    let err = lookup.find_files(None, None).unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));
}

#[test]
fn test_read_file() {
    let dir = workspace();
    let lookup = LocalFileLookup::new(dir.path());

    let text = lookup
        .read_file(&dir.path().join("src/main.rs"), ReadOptions::default())
        .unwrap();
    assert_eq!(text, "fn main() {}");

    let err = lookup
        .read_file(&dir.path().join("missing.rs"), ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));

    let err = lookup
        .read_file(&dir.path().join("src"), ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, FileError::NotAFile(_)));
}

#[test]
fn test_size_limit_and_override() {
    let dir = workspace();
    let big = dir.path().join("big.txt");
    fs::write(&big, "x".repeat(64)).unwrap();
    let lookup = LocalFileLookup::new(dir.path()).with_max_file_size(16);
    assert_eq!(lookup.max_file_size(), 16);

    let err = lookup.read_file(&big, ReadOptions::default()).unwrap_err();
    assert!(err.is_too_large());
    match err {
        FileError::TooLarge { size, limit, .. } => {
            assert_eq!(size, 64);
            assert_eq!(limit, 16);
        }
        other => panic!("unexpected error: {}", other),
    }

    let text = lookup
        .read_file(
            &big,
            ReadOptions {
                ignore_size_limit: true,
            },
        )
        .unwrap();
    assert_eq!(text.len(), 64);
}

#[test]
fn test_invalid_utf8_is_read_lossily() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("latin1.txt");
    fs::write(&file, b"caf\xe9 needle").unwrap();
    let lookup = LocalFileLookup::new(dir.path());

    let text = lookup.read_file(&file, ReadOptions::default()).unwrap();
    assert!(text.ends_with(" needle"));
    assert!(text.starts_with("caf"));
}
