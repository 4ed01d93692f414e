//! Set algebra over per-package file lists.
//!
//! Every operation here requires both input lists to be sorted ascending by
//! path and deduplicated, which the db and archive codecs guarantee at load
//! time. Directory entries (trailing `/`) are shared namespace rather than
//! owned content and never appear in the output.

use serde::{Deserialize, Serialize};

/// A single entry of a package's file list. Directories carry a trailing
/// `/` in `path`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_owned(),
            mode: 0,
            size: 0,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// Entries present in `a` but absent in `b`, in input order, directories
/// skipped.
pub fn difference<'a>(a: &'a [FileEntry], b: &[FileEntry]) -> Vec<&'a FileEntry> {
    let mut ret = vec![];
    let mut ia = 0;
    let mut ib = 0;

    while ia < a.len() && ib < b.len() {
        if a[ia].is_dir() {
            ia += 1;
        } else if b[ib].is_dir() {
            ib += 1;
        } else {
            match a[ia].path.as_bytes().cmp(b[ib].path.as_bytes()) {
                std::cmp::Ordering::Less => {
                    ret.push(&a[ia]);
                    ia += 1;
                }
                std::cmp::Ordering::Greater => ib += 1,
                std::cmp::Ordering::Equal => {
                    ia += 1;
                    ib += 1;
                }
            }
        }
    }

    while ia < a.len() {
        if !a[ia].is_dir() {
            ret.push(&a[ia]);
        }
        ia += 1;
    }

    ret
}

/// Entries present in both lists, in input order, directories skipped.
pub fn intersection<'a>(a: &'a [FileEntry], b: &[FileEntry]) -> Vec<&'a FileEntry> {
    let mut ret = vec![];
    let mut ia = 0;
    let mut ib = 0;

    while ia < a.len() && ib < b.len() {
        if a[ia].is_dir() {
            ia += 1;
        } else if b[ib].is_dir() {
            ib += 1;
        } else {
            match a[ia].path.as_bytes().cmp(b[ib].path.as_bytes()) {
                std::cmp::Ordering::Less => ia += 1,
                std::cmp::Ordering::Greater => ib += 1,
                std::cmp::Ordering::Equal => {
                    ret.push(&a[ia]);
                    ia += 1;
                    ib += 1;
                }
            }
        }
    }

    ret
}

/// Binary search a sorted file list for a path.
pub fn contains<'a>(files: &'a [FileEntry], path: &str) -> Option<&'a FileEntry> {
    files
        .binary_search_by(|entry| entry.path.as_bytes().cmp(path.as_bytes()))
        .ok()
        .map(|idx| &files[idx])
}

#[cfg(test)]
mod test {
    use super::*;

    fn list(paths: &[&str]) -> Vec<FileEntry> {
        paths.iter().map(|p| FileEntry::new(p)).collect()
    }

    fn paths(entries: Vec<&FileEntry>) -> Vec<&str> {
        entries.into_iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_difference() {
        let a = list(&["etc/", "etc/a.conf", "usr/", "usr/bin/foo", "usr/bin/qux"]);
        let b = list(&["etc/", "etc/a.conf", "usr/", "usr/bin/bar"]);
        assert_eq!(paths(difference(&a, &b)), &["usr/bin/foo", "usr/bin/qux"]);
    }

    #[test]
    fn test_difference_self_is_empty() {
        let a = list(&["etc/", "etc/a.conf", "usr/bin/foo"]);
        assert!(difference(&a, &a).is_empty());
    }

    #[test]
    fn test_intersection() {
        let a = list(&["etc/", "etc/a.conf", "usr/bin/foo"]);
        let b = list(&["etc/", "etc/a.conf", "usr/bin/bar"]);
        assert_eq!(paths(intersection(&a, &b)), &["etc/a.conf"]);
    }

    #[test]
    fn test_intersection_self_drops_dirs() {
        let a = list(&["etc/", "etc/a.conf", "usr/bin/foo"]);
        assert_eq!(
            paths(intersection(&a, &a)),
            &["etc/a.conf", "usr/bin/foo"]
        );
    }

    #[test]
    fn test_contains() {
        let a = list(&["etc/", "etc/a.conf", "usr/bin/foo"]);
        assert!(contains(&a, "usr/bin/foo").is_some());
        assert!(contains(&a, "etc/").is_some());
        assert!(contains(&a, "usr/bin/bar").is_none());
    }
}
