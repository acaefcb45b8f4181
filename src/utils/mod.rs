use crate::error::Result;
use std::path::Path;

/// Ensure directory exists
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Filesystem-safe directory name for a cancer type label
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|&c| c != ',')
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

/// Format duration as human-readable string
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}
