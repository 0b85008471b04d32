use std::path::PathBuf;

const APP_DIR: &str = "radio-roll";

/// `~/<parts..>/radio-roll`. The XDG layout is used on macOS too, so both
/// unix platforms share one set of paths.
fn under_home(parts: &[&str]) -> Option<PathBuf> {
    let mut dir = dirs::home_dir()?;
    dir.extend(parts);
    Some(dir.join(APP_DIR))
}

fn or_platform_default(dir: Option<PathBuf>, default: Option<PathBuf>) -> PathBuf {
    dir.or_else(|| default.map(|d| d.join(APP_DIR)))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Jingles and the log file live here.
pub fn data_dir() -> PathBuf {
    or_platform_default(under_home(&[".local", "share"]), dirs::data_local_dir())
}

pub fn config_dir() -> PathBuf {
    or_platform_default(under_home(&[".config"]), dirs::config_dir())
}

/// Downloaded tracks live under here.
pub fn cache_dir() -> PathBuf {
    or_platform_default(under_home(&[".cache"]), dirs::cache_dir())
}

#[cfg(unix)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv"]
}

#[cfg(windows)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv.exe", "mpv"]
}

#[cfg(unix)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp", "yt-dlp_linux", "yt-dlp_macos"]
}

#[cfg(windows)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp.exe", "yt-dlp"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.is_file() {
                return Some(p);
            }
        }
    }
    None
}

fn find_binary(env_var: &str, names: &[&str]) -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(env_var) {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }
    find_beside_exe(names).or_else(|| find_on_path(names))
}

/// Find the mpv binary for playback.
///
/// Searches in order:
/// 1. MPV_PATH environment variable
/// 2. Beside current executable (or its `external/` folder)
/// 3. PATH
pub fn find_mpv_binary() -> Option<PathBuf> {
    find_binary("MPV_PATH", mpv_binary_names())
}

/// Find the yt-dlp binary used for search and download.
///
/// Same order as [`find_mpv_binary`], with YT_DLP_PATH as the override.
pub fn find_yt_dlp_binary() -> Option<PathBuf> {
    find_binary("YT_DLP_PATH", yt_dlp_binary_names())
}
