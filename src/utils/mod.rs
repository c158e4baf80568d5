use anyhow::Result;
use url::Url;

/// Parse a URL and make sure it is an absolute HTTP(S) URL
pub fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| anyhow::anyhow!("Invalid URL format: {}", e))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    if parsed.host_str().is_none() {
        anyhow::bail!("URL has no host");
    }

    Ok(parsed)
}

/// Human-readable payload size, in binary units
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Turn a display name into a filesystem-safe slug.
///
/// Lowercase ASCII letters and digits are kept, every other run of characters
/// becomes a single `-`. Falls back to `audio` when nothing is left.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "audio".to_string()
    } else {
        slug
    }
}

/// Short identifier for a link, used to disambiguate output names.
///
/// For YouTube links this is the video id, otherwise the last path segment.
pub fn link_id(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;

    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        if !v.is_empty() {
            return Some(slugify(&v));
        }
    }

    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(slugify)
}

/// Check if the current environment has required tools
pub async fn check_dependencies(ffmpeg_path: &str, yt_dlp_path: Option<&str>) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(ffmpeg_path, "-version").await {
        missing.push(format!("{} - required for audio conversion", ffmpeg_path));
    }

    if let Some(yt_dlp) = yt_dlp_path {
        if !check_command_available(yt_dlp, "--version").await {
            missing.push(format!("{} - used when a stream cannot be read from the page", yt_dlp));
        }
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
