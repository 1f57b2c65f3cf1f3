//! Shared helper functions for CLI commands

use std::path::Path;

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Four significant decimals, with NaN and infinities spelled out
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "∞" } else { "-∞" }.to_string()
    } else if value != 0.0 && value.abs() < 1e-3 {
        format!("{:.3e}", value)
    } else {
        format!("{:.4}", value)
    }
}

/// Probabilities in scientific notation below one percent
pub fn format_probability(p: f64) -> String {
    if p.is_nan() {
        "n/a".to_string()
    } else if p > 0.0 && p < 0.01 {
        format!("{:.3e}", p)
    } else {
        format!("{:.4}", p)
    }
}

/// File name for messages, falling back to the full path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
