//! File system tools

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ToolError;

/// Directories searched below `$HOME` by FIND_FILE
const FIND_MAX_DEPTH: usize = 5;

/// Resolve user-facing paths: `~`, and bare folder names like `downloads`
pub(super) fn resolve(path: &str) -> PathBuf {
    let home = std::env::var("HOME").map(PathBuf::from).ok();
    let trimmed = path.trim();

    if let Some(home) = home {
        if trimmed == "~" {
            return home;
        }
        if let Some(rest) = trimmed.strip_prefix("~/") {
            return home.join(rest);
        }
        let known = match trimmed.to_ascii_lowercase().as_str() {
            "home" => Some(home.clone()),
            "desktop" => Some(home.join("Desktop")),
            "documents" => Some(home.join("Documents")),
            "downloads" => Some(home.join("Downloads")),
            "pictures" => Some(home.join("Pictures")),
            "music" => Some(home.join("Music")),
            "videos" => Some(home.join("Videos")),
            _ => None,
        };
        if let Some(dir) = known {
            return dir;
        }
    }
    PathBuf::from(trimmed)
}

fn failed(action: &str, path: &Path, e: std::io::Error) -> ToolError {
    ToolError::Failed(format!("{} {}: {}", action, path.display(), e))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(super) fn find_file(name: &str) -> Result<String, ToolError> {
    let home = std::env::var("HOME").map_err(|_| ToolError::Failed("HOME is not set".into()))?;
    find_below(Path::new(&home), name)
        .map(|path| format!("Found: {}", path.display()))
        .ok_or_else(|| ToolError::Failed(format!("Couldn't find {}", name)))
}

/// Breadth-first search for a file whose name contains `needle`
fn find_below(root: &Path, needle: &str) -> Option<PathBuf> {
    let needle = needle.to_lowercase();
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.starts_with('.') {
                continue;
            }
            if name.contains(&needle) {
                return Some(path);
            }
            if depth < FIND_MAX_DEPTH && entry.file_type().is_ok_and(|t| t.is_dir()) {
                queue.push_back((path, depth + 1));
            }
        }
    }
    None
}

pub(super) fn list_files(path: &str) -> Result<String, ToolError> {
    let dir = resolve(path);
    let mut names: Vec<String> = fs::read_dir(&dir)
        .map_err(|e| failed("cannot list", &dir, e))?
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(ToolError::Failed("No files found".into()));
    }
    let preview = names.iter().take(10).cloned().collect::<Vec<_>>().join(", ");
    Ok(format!("Found {} items: {}", names.len(), preview))
}

pub(super) fn read_file(path: &str) -> Result<String, ToolError> {
    let path = resolve(path);
    let content = fs::read_to_string(&path).map_err(|e| failed("cannot read", &path, e))?;
    Ok(format!("Read {} characters", content.chars().count()))
}

pub(super) fn create_file(path: &str, content: &str) -> Result<String, ToolError> {
    let path = resolve(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| failed("cannot create", parent, e))?;
    }
    fs::write(&path, content).map_err(|e| failed("cannot write", &path, e))?;
    Ok(format!("Created {}", display_name(&path)))
}

pub(super) fn create_folder(path: &str) -> Result<String, ToolError> {
    let path = resolve(path);
    fs::create_dir_all(&path).map_err(|e| failed("cannot create", &path, e))?;
    Ok(format!("Created folder {}", display_name(&path)))
}

/// Delete a file or an empty directory
pub(super) fn delete_path(path: &str) -> Result<String, ToolError> {
    let path = resolve(path);
    let result = if path.is_dir() {
        fs::remove_dir(&path)
    } else {
        fs::remove_file(&path)
    };
    result.map_err(|e| failed("cannot delete", &path, e))?;
    Ok(format!("Deleted {}", display_name(&path)))
}

/// Append to or overwrite a file
pub(super) fn edit_file(path: &str, content: &str, mode: &str) -> Result<String, ToolError> {
    let path = resolve(path);
    match mode {
        "overwrite" | "replace" => {
            fs::write(&path, content).map_err(|e| failed("cannot write", &path, e))?;
        }
        "append" => {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| failed("cannot open", &path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| failed("cannot write", &path, e))?;
        }
        other => return Err(ToolError::Failed(format!("unknown edit mode '{}'", other))),
    }
    Ok(format!("Updated {}", display_name(&path)))
}

/// Destination may be a directory, in which case the source name is kept
fn destination_for(source: &Path, destination: &str) -> PathBuf {
    let destination = resolve(destination);
    match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination,
    }
}

pub(super) fn copy_file(source: &str, destination: &str) -> Result<String, ToolError> {
    let source = resolve(source);
    let target = destination_for(&source, destination);
    fs::copy(&source, &target).map_err(|e| failed("cannot copy", &source, e))?;
    Ok(format!("Copied to {}", target.display()))
}

pub(super) fn move_file(source: &str, destination: &str) -> Result<String, ToolError> {
    let source = resolve(source);
    let target = destination_for(&source, destination);
    fs::rename(&source, &target).map_err(|e| failed("cannot move", &source, e))?;
    Ok(format!("Moved to {}", target.display()))
}

/// Sort loose files into per-category subfolders
pub(super) fn organize_files(path: &str) -> Result<String, ToolError> {
    let dir = resolve(path);
    let entries = fs::read_dir(&dir).map_err(|e| failed("cannot list", &dir, e))?;

    let mut moved = 0usize;
    for entry in entries.flatten() {
        let file = entry.path();
        if !file.is_file() {
            continue;
        }
        let extension = file
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let target_dir = dir.join(category_for(&extension));
        fs::create_dir_all(&target_dir).map_err(|e| failed("cannot create", &target_dir, e))?;
        fs::rename(&file, target_dir.join(entry.file_name()))
            .map_err(|e| failed("cannot move", &file, e))?;
        moved += 1;
    }
    Ok(format!("Organized {} files", moved))
}

fn category_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" => "Images",
        "pdf" | "doc" | "docx" | "txt" | "md" | "odt" | "rtf" | "xls" | "xlsx" | "ppt"
        | "pptx" | "csv" => "Documents",
        "mp3" | "wav" | "flac" | "ogg" | "m4a" => "Audio",
        "mp4" | "mkv" | "avi" | "mov" | "webm" => "Videos",
        "zip" | "tar" | "gz" | "rar" | "7z" => "Archives",
        "exe" | "msi" | "dmg" | "deb" | "rpm" | "appimage" => "Installers",
        _ => "Other",
    }
}

/// Remove everything in the user's trash directory
pub(super) fn empty_recycle_bin() -> Result<String, ToolError> {
    let home = std::env::var("HOME").map_err(|_| ToolError::Failed("HOME is not set".into()))?;
    let trash = if cfg!(target_os = "macos") {
        PathBuf::from(&home).join(".Trash")
    } else {
        PathBuf::from(&home).join(".local/share/Trash")
    };

    let dirs = if cfg!(target_os = "macos") {
        vec![trash]
    } else {
        vec![trash.join("files"), trash.join("info")]
    };

    let mut removed = 0usize;
    for dir in dirs {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| failed("cannot remove", &path, e))?;
            removed += 1;
        }
    }
    Ok(format!("Recycle bin emptied ({} entries)", removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn test_create_edit_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes").join("todo.txt");

        create_file(path_str(&file), "milk").unwrap();
        edit_file(path_str(&file), "\neggs", "append").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "milk\neggs");

        let detail = read_file(path_str(&file)).unwrap();
        assert_eq!(detail, "Read 9 characters");

        edit_file(path_str(&file), "bread", "overwrite").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "bread");

        delete_path(path_str(&file)).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_copy_into_directory_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let target_dir = dir.path().join("backup");
        fs::write(&source, "x").unwrap();
        fs::create_dir(&target_dir).unwrap();

        copy_file(path_str(&source), path_str(&target_dir)).unwrap();
        assert!(target_dir.join("a.txt").exists());
        assert!(source.exists());

        move_file(path_str(&source), path_str(&dir.path().join("b.txt"))).unwrap();
        assert!(!source.exists());
        assert!(dir.path().join("b.txt").exists());
    }

    #[test]
    fn test_list_and_organize() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("photo.PNG"), "").unwrap();
        fs::write(dir.path().join("report.pdf"), "").unwrap();
        fs::write(dir.path().join("mystery"), "").unwrap();

        let listing = list_files(path_str(dir.path())).unwrap();
        assert!(listing.starts_with("Found 3 items"));

        let detail = organize_files(path_str(dir.path())).unwrap();
        assert_eq!(detail, "Organized 3 files");
        assert!(dir.path().join("Images/photo.PNG").exists());
        assert!(dir.path().join("Documents/report.pdf").exists());
        assert!(dir.path().join("Other/mystery").exists());
    }

    #[test]
    fn test_empty_directory_listing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(path_str(dir.path())).is_err());
    }

    #[test]
    fn test_find_below_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Budget-2024.xlsx"), "").unwrap();

        let found = find_below(dir.path(), "budget").unwrap();
        assert_eq!(found, nested.join("Budget-2024.xlsx"));
        assert!(find_below(dir.path(), "missing").is_none());
    }

    #[test]
    fn test_delete_refuses_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("full");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("keep.txt"), "").unwrap();
        assert!(delete_path(path_str(&sub)).is_err());
        assert!(sub.exists());
    }

    #[test]
    fn test_resolve_plain_path_unchanged() {
        assert_eq!(resolve("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
