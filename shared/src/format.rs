use chrono::{DateTime, Utc};

/// Coarse relative-time label for activity feeds: "just now", "5m ago",
/// "3h ago", "2d ago", "1mo ago".
pub fn format_relative(now: DateTime<Utc>, instant: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(instant);
    if elapsed.num_seconds() < 60 {
        return "just now".to_string();
    }

    let minutes = elapsed.num_minutes();
    if minutes < 60 {
        return format!("{minutes}m ago");
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }

    let days = elapsed.num_days();
    if days < 30 {
        return format!("{days}d ago");
    }

    format!("{}mo ago", days / 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn relative_time_buckets() {
        let now = utc_at("2026-03-01T12:00:00Z");

        assert_eq!(format_relative(now, utc_at("2026-03-01T11:59:30Z")), "just now");
        // Clock skew in the future also reads as "just now".
        assert_eq!(format_relative(now, utc_at("2026-03-01T12:05:00Z")), "just now");
        assert_eq!(format_relative(now, utc_at("2026-03-01T11:15:00Z")), "45m ago");
        assert_eq!(format_relative(now, utc_at("2026-03-01T04:00:00Z")), "8h ago");
        assert_eq!(format_relative(now, utc_at("2026-02-26T12:00:00Z")), "3d ago");
        assert_eq!(format_relative(now, utc_at("2025-12-01T12:00:00Z")), "3mo ago");
    }
}
