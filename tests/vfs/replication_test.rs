//! Two filesystem copies driven by the same operation stream converge.

#[path = "../common/mod.rs"]
mod common;

use common::files;
use twinlsp::vfs::{
    create_one, delete_one, seed_all, FileSystem, MemoryFileSystem, VfsError, VfsPath,
};

enum Op {
    Seed(Vec<(&'static str, &'static str)>),
    Create(&'static str),
    Delete(&'static str),
}

fn apply(fs: &MemoryFileSystem, op: &Op) {
    match op {
        Op::Seed(entries) => {
            seed_all(fs, &files(entries)).unwrap();
        }
        Op::Create(uri) => {
            create_one(fs, uri).unwrap();
        }
        Op::Delete(uri) => {
            delete_one(fs, uri).unwrap();
        }
    }
}

fn session() -> Vec<Op> {
    vec![
        Op::Seed(vec![
            ("/project/src/app.py", "print('hi')"),
            ("/project/README.md", "# project"),
            ("/typeshed/stdlib/os/__init__.pyi", "def getcwd() -> str: ..."),
        ]),
        Op::Create("file:///project/src/util.py"),
        Op::Create("/project/tests/test_app.py"),
        Op::Delete("file:///project/README.md"),
        Op::Create("file:///project/src/app.py"),
        Op::Delete("/project/missing.py"),
    ]
}

#[test]
fn test_two_copies_converge() {
    let foreground = MemoryFileSystem::new();
    let background = MemoryFileSystem::new();

    for op in &session() {
        apply(&foreground, op);
        apply(&background, op);
    }

    assert_eq!(foreground.files(), background.files());
    assert_eq!(foreground.directories(), background.directories());
    assert_eq!(
        foreground.files(),
        files(&[
            ("/project/src/app.py", "print('hi')"),
            ("/project/src/util.py", ""),
            ("/project/tests/test_app.py", ""),
            ("/typeshed/stdlib/os/__init__.pyi", "def getcwd() -> str: ..."),
        ])
    );
}

#[test]
fn test_replaying_the_stream_changes_nothing() {
    let once = MemoryFileSystem::new();
    let twice = MemoryFileSystem::new();

    for op in &session() {
        apply(&once, op);
        apply(&twice, op);
        apply(&twice, op);
    }

    assert_eq!(once.files(), twice.files());
}

#[test]
fn test_create_never_overwrites_seeded_content() {
    let fs = MemoryFileSystem::new();
    seed_all(&fs, &files(&[("/src/main.py", "x = 1")])).unwrap();

    assert!(!create_one(&fs, "file:///src/main.py").unwrap());
    assert_eq!(fs.files()["/src/main.py"], "x = 1");
}

#[test]
fn test_uri_and_path_address_the_same_file() {
    let fs = MemoryFileSystem::new();

    assert!(create_one(&fs, "file:///my%20project/a.py").unwrap());
    assert!(fs.is_file(&VfsPath::from_path("/my project/a.py").unwrap()));

    assert!(delete_one(&fs, "/my project/a.py").unwrap());
    assert!(!delete_one(&fs, "file:///my%20project/a.py").unwrap());
    assert!(fs.files().is_empty());
}

#[test]
fn test_delete_leaves_directories_in_place() {
    let fs = MemoryFileSystem::new();
    create_one(&fs, "/pkg/sub/mod.py").unwrap();
    delete_one(&fs, "/pkg/sub/mod.py").unwrap();

    assert!(fs.files().is_empty());
    assert!(fs.exists(&VfsPath::from_path("/pkg/sub").unwrap()));
}

#[test]
fn test_relative_paths_are_rejected() {
    let fs = MemoryFileSystem::new();
    assert!(matches!(
        create_one(&fs, "relative/a.py"),
        Err(VfsError::InvalidPath(_))
    ));
    assert!(matches!(
        seed_all(&fs, &files(&[("relative/b.py", "")])),
        Err(VfsError::InvalidPath(_))
    ));
}

#[test]
fn test_seeding_nothing_is_a_no_op() {
    let fs = MemoryFileSystem::new();
    assert_eq!(seed_all(&fs, &files(&[])).unwrap(), 0);
    assert!(fs.files().is_empty());
    assert_eq!(fs.directories(), vec!["/".to_string()]);
}

#[test]
fn test_deleting_a_directory_path_is_a_no_op() {
    let foreground = MemoryFileSystem::new();
    let background = MemoryFileSystem::new();
    for fs in [&foreground, &background] {
        seed_all(fs, &files(&[("/pkg/a.py", "")])).unwrap();
        assert!(!delete_one(fs, "file:///pkg").unwrap());
    }

    assert_eq!(foreground.files(), files(&[("/pkg/a.py", "")]));
    assert_eq!(foreground.files(), background.files());
}

#[test]
fn test_failed_seed_writes_nothing() {
    let fs = MemoryFileSystem::new();
    let result = seed_all(
        &fs,
        &files(&[("/src/a.py", "a"), ("/src/b.py", "b"), ("src/c.py", "c")]),
    );

    assert!(matches!(result, Err(VfsError::InvalidPath(_))));
    assert!(fs.files().is_empty());
    assert!(!fs.exists(&VfsPath::from_path("/src").unwrap()));
}

#[test]
fn test_uri_query_and_fragment_do_not_reach_the_path() {
    let fs = MemoryFileSystem::new();
    assert!(create_one(&fs, "file:///src/a.py?version=2#L10").unwrap());
    assert_eq!(fs.files(), files(&[("/src/a.py", "")]));
    assert!(delete_one(&fs, "file:///src/a.py#top").unwrap());
    assert!(fs.files().is_empty());
}

#[test]
fn test_malformed_escapes_are_kept_literally() {
    let fs = MemoryFileSystem::new();
    assert!(create_one(&fs, "file:///a%+1.py").unwrap());
    assert_eq!(fs.files(), files(&[("/a%+1.py", "")]));
}
