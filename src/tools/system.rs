//! Process, launcher and system query tools

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rand::seq::SliceRandom;
use reqwest::Url;
use sysinfo::{Disks, System};
use tracing::debug;

use super::files::resolve;
use super::ToolError;

/// Characters of command output kept in the detail line
const OUTPUT_PREVIEW_CHARS: usize = 300;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// The platform's "open this with the default handler" program
fn opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "explorer"
    } else {
        "xdg-open"
    }
}

fn spawn_detached(program: &str, args: &[&str]) -> Result<(), ToolError> {
    debug!(program, ?args, "spawning");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| ToolError::Failed(format!("cannot start {}: {}", program, e)))
}

pub(super) fn open_application(name: &str) -> Result<String, ToolError> {
    if cfg!(target_os = "macos") {
        spawn_detached("open", &["-a", name])?;
    } else {
        let program = which::which(name)
            .or_else(|_| which::which(name.to_lowercase()))
            .map_err(|_| ToolError::Failed(format!("Couldn't find {}", name)))?;
        let program = program.to_string_lossy();
        spawn_detached(&program, &[])?;
    }
    Ok(format!("Opened {}", name))
}

pub(super) fn open_folder(path: &str) -> Result<String, ToolError> {
    let dir = resolve(path);
    if !dir.is_dir() {
        return Err(ToolError::Failed("Folder not found".into()));
    }
    spawn_detached(opener(), &[&dir.to_string_lossy()])?;
    Ok(format!("Opened {}", dir.display()))
}

/// Normalise a user-supplied address into an http(s) URL
fn normalize_url(raw: &str) -> Result<Url, ToolError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&candidate).map_err(|e| ToolError::Failed(format!("invalid URL '{}': {}", raw, e)))
}

pub(super) fn open_url(raw: &str) -> Result<String, ToolError> {
    let url = normalize_url(raw)?;
    spawn_detached(opener(), &[url.as_str()])?;
    Ok("URL opened".to_string())
}

fn search_url(query: &str) -> Result<Url, ToolError> {
    Url::parse_with_params("https://www.google.com/search", &[("q", query)])
        .map_err(|e| ToolError::Failed(e.to_string()))
}

pub(super) fn google_search(query: &str) -> Result<String, ToolError> {
    let url = search_url(query)?;
    spawn_detached(opener(), &[url.as_str()])?;
    Ok(format!("Searching for {}", query))
}

pub(super) fn run_command(command: &str) -> Result<String, ToolError> {
    let output = if cfg!(windows) {
        Command::new("cmd").args(["/C", command]).output()
    } else {
        Command::new("sh").args(["-c", command]).output()
    }
    .map_err(|e| ToolError::Failed(format!("cannot run command: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let preview: String = stdout.trim().chars().take(OUTPUT_PREVIEW_CHARS).collect();
    if output.status.success() {
        Ok(if preview.is_empty() {
            "Command executed".to_string()
        } else {
            preview
        })
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason: String = stderr.trim().chars().take(OUTPUT_PREVIEW_CHARS).collect();
        Err(ToolError::Failed(format!("command failed ({}): {}", output.status, reason)))
    }
}

/// Summarise memory, CPU, disk or everything
pub(super) fn system_info(kind: &str) -> Result<String, ToolError> {
    let mut sys = System::new();
    match kind.to_ascii_lowercase().as_str() {
        "memory" | "ram" => {
            sys.refresh_memory();
            Ok(format_memory(&sys))
        }
        "cpu" => {
            refresh_cpu(&mut sys);
            Ok(format_cpu(&sys))
        }
        "disk" | "storage" => Ok(format_disk(&Disks::new_with_refreshed_list())),
        _ => {
            sys.refresh_memory();
            refresh_cpu(&mut sys);
            let host = System::host_name().unwrap_or_else(|| "unknown".to_string());
            Ok(format!(
                "System: {} | {} | {} | {}",
                host,
                format_memory(&sys),
                format_cpu(&sys),
                format_disk(&Disks::new_with_refreshed_list())
            ))
        }
    }
}

fn refresh_cpu(sys: &mut System) {
    // Usage is a delta between two samples
    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
}

fn format_memory(sys: &System) -> String {
    let total = sys.total_memory() as f64 / GIB;
    let available = sys.available_memory() as f64 / GIB;
    let used_pct = if total > 0.0 {
        (1.0 - available / total) * 100.0
    } else {
        0.0
    };
    format!(
        "RAM: {:.1}GB total, {:.1}GB available ({:.0}% used)",
        total, available, used_pct
    )
}

fn format_cpu(sys: &System) -> String {
    format!(
        "CPU: {:.0}% usage, {} cores",
        sys.global_cpu_usage(),
        sys.cpus().len()
    )
}

fn format_disk(disks: &Disks) -> String {
    let (total, free) = disks.list().iter().fold((0u64, 0u64), |(t, f), disk| {
        (t + disk.total_space(), f + disk.available_space())
    });
    format!(
        "Disk: {:.0}GB total, {:.0}GB free",
        total as f64 / GIB,
        free as f64 / GIB
    )
}

/// Terminate every process whose name matches, ignoring a `.exe` suffix
pub(super) fn kill_process(name: &str) -> Result<String, ToolError> {
    let target = process_key(name);
    let sys = System::new_all();

    let mut killed = 0usize;
    for process in sys.processes().values() {
        if process_key(&process.name().to_string_lossy()) == target && process.kill() {
            killed += 1;
        }
    }

    if killed == 0 {
        return Err(ToolError::Failed("Process not found".into()));
    }
    Ok(format!("Terminated {} ({} processes)", name, killed))
}

fn process_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
}

/// Capture the screen with whichever capture program is installed
pub(super) fn take_screenshot(path: Option<&str>) -> Result<String, ToolError> {
    let target = match path {
        Some(p) => resolve(p),
        None => {
            let home = std::env::var("HOME")
                .map_err(|_| ToolError::Failed("HOME is not set".into()))?;
            let stamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            resolve(&home).join(format!("screenshot_{}.png", stamp))
        }
    };
    let target_str = target.to_string_lossy().into_owned();

    let candidates: [(&str, &[&str]); 4] = [
        ("screencapture", &["-x"]),
        ("grim", &[]),
        ("gnome-screenshot", &["-f"]),
        ("scrot", &[]),
    ];
    let (program, args) = candidates
        .iter()
        .find(|(program, _)| which::which(program).is_ok())
        .ok_or_else(|| ToolError::Failed("no screenshot program installed".into()))?;

    let status = Command::new(program)
        .args(*args)
        .arg(&target_str)
        .status()
        .map_err(|e| ToolError::Failed(format!("cannot start {}: {}", program, e)))?;
    if !status.success() {
        return Err(ToolError::Failed("Screenshot failed".into()));
    }
    Ok(format!("Screenshot saved to {}", target_str))
}

const WALLPAPER_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "heic", "webp"];

/// Folders holding the desktop's stock wallpapers
const DEFAULT_WALLPAPER_DIRS: [&str; 3] = [
    "/System/Library/Desktop Pictures",
    "/usr/share/backgrounds",
    "/usr/share/wallpapers",
];

fn is_wallpaper_image(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| WALLPAPER_EXTENSIONS.contains(&e.as_str()))
}

/// The requested image, or a random stock wallpaper when none is named
fn wallpaper_image(path: Option<&str>) -> Result<PathBuf, ToolError> {
    if let Some(p) = path {
        let image = resolve(p);
        if !image.is_file() {
            return Err(ToolError::Failed("Image not found".into()));
        }
        if !is_wallpaper_image(&image) {
            return Err(ToolError::Failed(format!("{} is not an image", image.display())));
        }
        return Ok(image);
    }

    let stock: Vec<PathBuf> = DEFAULT_WALLPAPER_DIRS
        .iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flat_map(|entries| entries.flatten().map(|entry| entry.path()))
        .filter(|p| p.is_file() && is_wallpaper_image(p))
        .collect();
    stock
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| ToolError::Failed("No default wallpapers found".into()))
}

/// Command line that sets `image` as the desktop background
fn wallpaper_setter(image: &str) -> Result<(&'static str, Vec<String>), ToolError> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "tell application \"System Events\" to tell every desktop to set picture to \"{}\"",
            image.replace('\\', "\\\\").replace('"', "\\\"")
        );
        return Ok(("osascript", vec!["-e".into(), script]));
    }
    if which::which("gsettings").is_ok() {
        return Ok((
            "gsettings",
            vec![
                "set".into(),
                "org.gnome.desktop.background".into(),
                "picture-uri".into(),
                format!("file://{}", image),
            ],
        ));
    }
    if which::which("feh").is_ok() {
        return Ok(("feh", vec!["--bg-fill".into(), image.to_string()]));
    }
    Err(ToolError::Failed("no wallpaper program installed".into()))
}

pub(super) fn change_wallpaper(path: Option<&str>) -> Result<String, ToolError> {
    let image = wallpaper_image(path)?;
    let image_str = image.to_string_lossy().into_owned();
    let (program, args) = wallpaper_setter(&image_str)?;

    let status = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| ToolError::Failed(format!("cannot start {}: {}", program, e)))?;
    if !status.success() {
        return Err(ToolError::Failed("Failed to change wallpaper".into()));
    }
    Ok("Wallpaper changed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(
            normalize_url("http://localhost:8080/x").unwrap().as_str(),
            "http://localhost:8080/x"
        );
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("rust & tokio").unwrap();
        assert_eq!(url.query(), Some("q=rust+%26+tokio"));
    }

    #[test]
    fn test_process_key_strips_exe() {
        assert_eq!(process_key("Chrome.EXE"), "chrome");
        assert_eq!(process_key(" firefox "), "firefox");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_reports_output_and_failure() {
        assert_eq!(run_command("echo hello").unwrap(), "hello");
        assert_eq!(run_command("true").unwrap(), "Command executed");
        assert!(matches!(run_command("exit 3"), Err(ToolError::Failed(_))));
    }

    #[test]
    fn test_memory_summary() {
        let detail = system_info("memory").unwrap();
        assert!(detail.starts_with("RAM:"));
    }

    #[test]
    fn test_open_missing_folder_fails() {
        assert!(open_folder("/definitely/not/here").is_err());
    }

    #[test]
    fn test_wallpaper_requires_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "not a picture").unwrap();

        assert_eq!(
            change_wallpaper(Some("/definitely/not/here.png")),
            Err(ToolError::Failed("Image not found".into()))
        );
        assert!(matches!(
            change_wallpaper(Some(&notes.to_string_lossy())),
            Err(ToolError::Failed(msg)) if msg.ends_with("is not an image")
        ));
    }

    #[test]
    fn test_wallpaper_image_accepts_pictures() {
        let dir = tempfile::tempdir().unwrap();
        let picture = dir.path().join("beach.JPG");
        std::fs::write(&picture, [0u8; 4]).unwrap();

        assert!(is_wallpaper_image(&picture));
        assert_eq!(wallpaper_image(Some(&picture.to_string_lossy())).unwrap(), picture);
    }
}
