//! Time formatting helpers for log lines and status text.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// "`<duration>` ago", or "never" for a zero timestamp.
pub fn format_age(then_secs: u64, now_secs: u64) -> String {
    if then_secs == 0 {
        return "never".to_string();
    }
    format!("{} ago", format_duration(now_secs.saturating_sub(then_secs)))
}
