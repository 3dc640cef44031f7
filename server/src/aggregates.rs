//! Read-side aggregation logic: pure functions of stored rows and
//! calendar-derived windows. Handlers fetch rows and these functions
//! shape them; nothing here touches the database or the wall clock.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::db::types::{DailyCountRecord, LeaderboardRecord, NewWeeklyLeaderboardEntry};
use shared::Calendar;

/// How far back the streak walk queries. Streaks longer than this are
/// reported as the horizon.
pub const STREAK_LOOKBACK_DAYS: i64 = 90;

/// Rounded percentage change between two windows. A zero previous
/// window reads as +100 when there is any current activity, so growth
/// from nothing still registers without dividing by zero.
pub fn pct_change(current: i64, previous: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    ((current - previous) as f64 / previous as f64 * 100.0).round() as i64
}

pub fn avg_commits_per_contributor(commits: i64, contributors: i64) -> i64 {
    if contributors == 0 {
        return 0;
    }
    (commits as f64 / contributors as f64).round() as i64
}

/// Consecutive local days with at least one commit, walking backward
/// from `today`. Stops at the first silent day.
pub fn streak(days_with_commits: &HashSet<NaiveDate>, today: NaiveDate) -> i64 {
    let mut streak = 0;
    let mut cursor = today;
    while days_with_commits.contains(&cursor) {
        streak += 1;
        let Some(prev) = cursor.pred_opt() else { break };
        cursor = prev;
    }
    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub count: i64,
}

/// Zero-filled per-day series covering every date in `from..=to`, one
/// entry per day whether or not anything was committed.
pub fn zero_filled_daily(
    counts: &[DailyCountRecord],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<HeatmapDay> {
    let by_day: BTreeMap<NaiveDate, i64> = counts.iter().map(|c| (c.day, c.commits)).collect();

    let mut series = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        series.push(HeatmapDay {
            date: cursor,
            count: by_day.get(&cursor).copied().unwrap_or(0),
        });
        let Some(next) = cursor.succ_opt() else { break };
        cursor = next;
    }
    series
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WeekPoint {
    pub week: String,
    pub commits: i64,
}

/// Fold daily counts into Monday-keyed weeks, labelled by week start.
pub fn weekly_series(counts: &[DailyCountRecord], calendar: &Calendar) -> Vec<WeekPoint> {
    let mut weeks: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for count in counts {
        *weeks.entry(calendar.week_start_date(count.day)).or_default() += count.commits;
    }

    weeks
        .into_iter()
        .map(|(start, commits)| WeekPoint {
            week: start.format("%b %-d").to_string(),
            commits,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthPoint {
    pub month: String,
    pub commits: i64,
    pub cumulative: i64,
}

/// Per-month counts with a running total, for the year-to-date chart.
pub fn cumulative_monthly_series(counts: &[DailyCountRecord]) -> Vec<MonthPoint> {
    let mut months: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    for count in counts {
        *months
            .entry((count.day.year(), count.day.month()))
            .or_default() += count.commits;
    }

    let mut cumulative = 0;
    months
        .into_iter()
        .map(|((year, month), commits)| {
            cumulative += commits;
            let label = NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default();
            MonthPoint {
                month: label,
                commits,
                cumulative,
            }
        })
        .collect()
}

/// Drop author-attribution trailer lines before a message is surfaced.
pub fn clean_message(message: &str) -> String {
    message
        .lines()
        .filter(|line| !line.contains("Co-Authored-By:"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Content-addressed stand-in for a private repo's commit message: the
/// same message always maps to the same digest, so consumers can
/// de-duplicate without seeing the text.
pub fn message_digest(cleaned: &str) -> String {
    hex::encode(Sha256::digest(cleaned.as_bytes()))
}

pub fn display_message(message: &str, is_private: bool) -> String {
    let cleaned = clean_message(message);
    if is_private {
        message_digest(&cleaned)
    } else {
        cleaned
    }
}

pub fn display_url(url: &str, is_private: bool) -> String {
    if is_private {
        "#".to_string()
    } else {
        url.to_string()
    }
}

/// Freeze a leaderboard into archive rows with dense 1..N ranks in the
/// board's already-sorted order.
pub fn archive_entries(
    board: &[LeaderboardRecord],
    year: i32,
    week: i32,
) -> Vec<NewWeeklyLeaderboardEntry> {
    board
        .iter()
        .enumerate()
        .map(|(idx, member)| NewWeeklyLeaderboardEntry {
            year,
            week,
            username: member.username.clone(),
            avatar_url: member.avatar_url.clone(),
            commits: member.commits as i32,
            additions: member.additions as i32,
            deletions: member.deletions as i32,
            rank: idx as i32 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn day(s: &str, commits: i64) -> DailyCountRecord {
        DailyCountRecord {
            day: date(s),
            commits,
        }
    }

    #[test]
    fn pct_change_edge_cases() {
        assert_eq!(pct_change(0, 0), 0);
        assert_eq!(pct_change(5, 0), 100);
        assert_eq!(pct_change(50, 100), -50);
        assert_eq!(pct_change(150, 100), 50);
        assert_eq!(pct_change(1, 3), -67);
    }

    #[test]
    fn streak_counts_consecutive_days_back_from_today() {
        let today = date("2026-02-10");
        let days: HashSet<_> = [
            date("2026-02-10"),
            date("2026-02-09"),
            date("2026-02-08"),
            // Gap on the 7th, activity further back does not count.
            date("2026-02-05"),
        ]
        .into_iter()
        .collect();

        assert_eq!(streak(&days, today), 3);
    }

    #[test]
    fn streak_is_zero_without_a_commit_today() {
        let days: HashSet<_> = [date("2026-02-09")].into_iter().collect();
        assert_eq!(streak(&days, date("2026-02-10")), 0);
        assert_eq!(streak(&HashSet::new(), date("2026-02-10")), 0);
    }

    #[test]
    fn heatmap_series_covers_every_day_in_range() {
        let counts = [day("2026-01-02", 3), day("2026-01-05", 1)];
        let series = zero_filled_daily(&counts, date("2026-01-01"), date("2026-01-07"));

        assert_eq!(series.len(), 7);
        assert_eq!(
            series[0],
            HeatmapDay {
                date: date("2026-01-01"),
                count: 0
            }
        );
        assert_eq!(series[1].count, 3);
        assert_eq!(series[4].count, 1);
        assert_eq!(series[6].count, 0);
    }

    #[test]
    fn weekly_series_folds_days_into_monday_weeks() {
        let calendar = Calendar::from_offset_hours(-5).unwrap();
        // Mon 2026-02-02 through Sun 2026-02-08 is one week; Mon
        // 2026-02-09 opens the next.
        let counts = [
            day("2026-02-03", 2),
            day("2026-02-08", 1),
            day("2026-02-09", 5),
        ];

        let series = weekly_series(&counts, &calendar);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].week, "Feb 2");
        assert_eq!(series[0].commits, 3);
        assert_eq!(series[1].week, "Feb 9");
        assert_eq!(series[1].commits, 5);
    }

    #[test]
    fn cumulative_monthly_keeps_a_running_total() {
        let counts = [
            day("2026-01-05", 2),
            day("2026-01-20", 3),
            day("2026-03-01", 4),
        ];

        let series = cumulative_monthly_series(&counts);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].month, "Jan");
        assert_eq!((series[0].commits, series[0].cumulative), (5, 5));
        assert_eq!(series[1].month, "Mar");
        assert_eq!((series[1].commits, series[1].cumulative), (4, 9));
    }

    #[test]
    fn message_cleanup_strips_coauthor_trailers() {
        assert_eq!(clean_message("fix bug\n\nCo-Authored-By: X <x@x>"), "fix bug");
        assert_eq!(
            clean_message("feat: things\n\nbody line\nCo-Authored-By: Y <y@y>\n"),
            "feat: things\n\nbody line"
        );
        assert_eq!(clean_message("plain message"), "plain message");
    }

    #[test]
    fn private_repos_get_a_deterministic_digest_instead_of_text() {
        let message = "fix bug\n\nCo-Authored-By: X <x@x>";

        let masked = display_message(message, true);
        assert_eq!(masked, message_digest("fix bug"));
        assert_eq!(masked.len(), 64);
        // Same cleaned message, same digest.
        assert_eq!(display_message("fix bug", true), masked);

        assert_eq!(display_message(message, false), "fix bug");
    }

    #[test]
    fn commit_links_are_suppressed_for_private_repos() {
        let url = "https://github.com/acme/r1/commit/abc";
        assert_eq!(display_url(url, true), "#");
        assert_eq!(display_url(url, false), url);
    }

    #[test]
    fn archive_ranks_are_dense_in_board_order() {
        let member = |username: &str, commits: i64| LeaderboardRecord {
            username: username.to_string(),
            avatar_url: None,
            commits,
            additions: 0,
            deletions: 0,
        };
        let board = vec![member("alice", 7), member("bob", 7), member("carol", 3)];

        let entries = archive_entries(&board, 2026, 6);
        assert_eq!(entries.len(), 3);
        assert_eq!((entries[0].rank, entries[0].username.as_str()), (1, "alice"));
        assert_eq!((entries[1].rank, entries[1].username.as_str()), (2, "bob"));
        assert_eq!((entries[2].rank, entries[2].username.as_str()), (3, "carol"));
        assert!(entries.iter().all(|e| (e.year, e.week) == (2026, 6)));
    }

    #[test]
    fn average_commits_guards_against_empty_weeks() {
        assert_eq!(avg_commits_per_contributor(9, 4), 2);
        assert_eq!(avg_commits_per_contributor(10, 4), 3);
        assert_eq!(avg_commits_per_contributor(5, 0), 0);
    }
}
