use humansize::{BINARY, format_size};

/// Format a byte count, e.g. `1.5 GiB`
pub fn format_file_size(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

/// Format seconds as `H:MM:SS`, or `M:SS` under an hour
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
