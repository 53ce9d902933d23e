//! Heuristics shared by detectors that have to guess a path from a window title.

use std::path::{Path, PathBuf};

/// Directories where documents opened by name usually live.
pub fn common_document_dirs() -> Vec<PathBuf> {
    [dirs::document_dir(), dirs::desktop_dir(), dirs::download_dir()]
        .into_iter()
        .flatten()
        .collect()
}

/// Known folders a file browser shows under a display name instead of a path.
pub fn special_folders() -> Vec<(&'static str, PathBuf)> {
    let mut folders = vec![];
    let mut push = |labels: &[&'static str], dir: Option<PathBuf>| {
        if let Some(dir) = dir {
            for label in labels {
                folders.push((*label, dir.clone()));
            }
        }
    };
    push(&["Desktop", "デスクトップ"], dirs::desktop_dir());
    push(&["Documents", "ドキュメント"], dirs::document_dir());
    push(&["Downloads", "ダウンロード"], dirs::download_dir());
    push(&["Pictures", "ピクチャ"], dirs::picture_dir());
    push(&["Music", "ミュージック"], dirs::audio_dir());
    push(&["Videos", "ビデオ"], dirs::video_dir());
    push(&["PC"], Some(PathBuf::from("C:\\")));
    folders
}

pub fn has_extension(path: &str, extensions: &[&str]) -> bool {
    let lower = path.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

/// First `dir/name` that exists, trying names in order for every directory.
pub fn probe<'a>(dirs: &[PathBuf], names: impl IntoIterator<Item = &'a str> + Clone) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        names
            .clone()
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
    })
}

pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
