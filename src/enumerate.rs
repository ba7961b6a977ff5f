//! Image enumeration: list the page images in a folder in reading order.
//!
//! Scanned pages are usually named `page1.png … page10.png`, so plain lexical
//! ordering would put `page10` before `page2`. [`collect_images`] orders file
//! names with [`natural_cmp`], which compares embedded digit runs by value.

use crate::error::Img2MdError;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions accepted as page images (matched case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// An ordered, immutable set of image paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSet {
    paths: Vec<PathBuf>,
}

impl ImageSet {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }

    /// File names in order, lossily converted to UTF-8.
    pub fn file_names(&self) -> Vec<String> {
        self.paths.iter().map(|p| file_name_of(p)).collect()
    }
}

impl<'a> IntoIterator for &'a ImageSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

/// Check that `path` is an existing directory and return its canonical form.
///
/// Canonicalising up front means `.` or `../scans` still yield a real folder
/// name for the output file.
pub fn validate_folder(path: &Path) -> Result<PathBuf, Img2MdError> {
    if !path.exists() {
        return Err(Img2MdError::FolderNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(Img2MdError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    std::fs::canonicalize(path).map_err(|e| Img2MdError::ReadDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// List the image files directly inside `folder`, naturally sorted by name.
///
/// Only regular files (or symlinks to them) whose extension is in
/// [`IMAGE_EXTENSIONS`] are returned. Sub-directories are not descended into.
/// An empty set is not an error.
pub fn collect_images(folder: &Path) -> Result<ImageSet, Img2MdError> {
    let entries = std::fs::read_dir(folder).map_err(|e| Img2MdError::ReadDirFailed {
        path: folder.to_path_buf(),
        source: e,
    })?;

    let mut keyed: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Img2MdError::ReadDirFailed {
            path: folder.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !has_image_extension(&path) || !path.is_file() {
            continue;
        }
        keyed.push((file_name_of(&path), path));
    }

    keyed.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    keyed.dedup_by(|(_, a), (_, b)| a == b);

    debug!("Found {} images in {}", keyed.len(), folder.display());
    Ok(ImageSet {
        paths: keyed.into_iter().map(|(_, p)| p).collect(),
    })
}

/// `true` when the extension is one of [`IMAGE_EXTENSIONS`], ignoring case.
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Natural ordering ─────────────────────────────────────────────────────

/// Compare two strings so that ASCII digit runs compare by numeric value.
///
/// Text runs compare case-insensitively; a digit run sorts before a text run
/// at the same position. Leading zeros do not change a number's value, but
/// when everything else ties the strings fall back to plain byte order so
/// the result is a total order.
///
/// ```rust
/// use edgequake_img2md::enumerate::natural_cmp;
/// use std::cmp::Ordering;
///
/// assert_eq!(natural_cmp("img2", "img10"), Ordering::Less);
/// assert_eq!(natural_cmp("Page-3", "page-3"), Ordering::Less);
/// ```
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunks(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if digits {
            Chunk::Digits(head)
        } else {
            Chunk::Text(head)
        })
    }
}

fn compare_chunks(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Digits(x), Chunk::Digits(y)) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            // Equal-length digit strings compare lexically as numbers do.
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (Chunk::Text(x), Chunk::Text(y)) => x
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(y.chars().flat_map(char::to_lowercase)),
        (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
    }
}
