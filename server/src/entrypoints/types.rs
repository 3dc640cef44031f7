use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::aggregates::{self, pct_change, MonthPoint, WeekPoint};
use crate::db::types::{
    CommitRecord, LeaderboardRecord, RepoGrowthRecord, SnapshotWeekRecord, WeeklyLeaderboardRecord,
    WindowStatsRecord,
};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, ToSchema)]
pub struct WindowCounts {
    pub commits: i64,
    pub additions: i64,
    pub deletions: i64,
}

impl From<WindowStatsRecord> for WindowCounts {
    fn from(record: WindowStatsRecord) -> Self {
        Self {
            commits: record.commits,
            additions: record.additions,
            deletions: record.deletions,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub commits_today: i64,
    pub active_repos: i64,
    pub team_streak: i64,
    pub total_commits: i64,
    pub week_stats: WindowCounts,
    pub month_stats: WindowCounts,
    pub active_contributors: i64,
}

/// One metric across two adjacent windows plus its rounded change.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricComparison {
    pub current: i64,
    pub previous: i64,
    pub change: i64,
}

impl MetricComparison {
    pub fn new(current: i64, previous: i64) -> Self {
        Self {
            current,
            previous,
            change: pct_change(current, previous),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WeekOverWeek {
    pub commits: MetricComparison,
    pub additions: MetricComparison,
    pub deletions: MetricComparison,
    pub contributors: MetricComparison,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MonthOverMonth {
    pub commits: MetricComparison,
    pub additions: MetricComparison,
    pub deletions: MetricComparison,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Velocity {
    pub net_lines: i64,
    pub prev_net_lines: i64,
    pub change: i64,
    pub avg_commits_per_contributor: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ContributorTrends {
    pub active_wow_change: i64,
    pub new_this_month: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct GrowingRepo {
    pub name: String,
    pub current_commits: i64,
    pub prev_commits: i64,
    pub growth: i64,
}

impl From<RepoGrowthRecord> for GrowingRepo {
    fn from(record: RepoGrowthRecord) -> Self {
        Self {
            name: record.repo_name,
            current_commits: record.current_commits,
            prev_commits: record.prev_commits,
            growth: record.growth,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsResponse {
    pub wow: WeekOverWeek,
    pub mom: MonthOverMonth,
    pub ytd: WindowCounts,
    pub weekly_chart: Vec<WeekPoint>,
    pub velocity: Velocity,
    pub contributor_trends: ContributorTrends,
    pub top_growing_repos: Vec<GrowingRepo>,
    pub cumulative_monthly: Vec<MonthPoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardMemberResponse {
    pub name: String,
    pub commits: i64,
    pub additions: i64,
    pub deletions: i64,
    pub avatar_url: Option<String>,
}

impl From<LeaderboardRecord> for LeaderboardMemberResponse {
    fn from(record: LeaderboardRecord) -> Self {
        Self {
            name: record.username,
            commits: record.commits,
            additions: record.additions,
            deletions: record.deletions,
            avatar_url: record.avatar_url,
        }
    }
}

/// Archiver outcome. The window fields are absent when archiving was a
/// no-op (nothing to save, or the week is already frozen).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members_archived: Option<u64>,
}

impl SnapshotResponse {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            year: None,
            week: None,
            members_archived: None,
        }
    }

    pub fn archived(year: i32, week: i32, members_archived: u64) -> Self {
        Self {
            message: format!("Saved {members_archived} members for week {week} of {year}"),
            year: Some(year),
            week: Some(week),
            members_archived: Some(members_archived),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotWeekResponse {
    pub year: i32,
    pub week: i32,
}

impl From<SnapshotWeekRecord> for SnapshotWeekResponse {
    fn from(record: SnapshotWeekRecord) -> Self {
        Self {
            year: record.year,
            week: record.week,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchivedMemberResponse {
    pub username: String,
    pub avatar_url: Option<String>,
    pub commits: i32,
    pub additions: i32,
    pub deletions: i32,
    pub rank: i32,
}

impl From<WeeklyLeaderboardRecord> for ArchivedMemberResponse {
    fn from(record: WeeklyLeaderboardRecord) -> Self {
        Self {
            username: record.username,
            avatar_url: record.avatar_url,
            commits: record.commits,
            additions: record.additions,
            deletions: record.deletions,
            rank: record.rank,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchivedWeekResponse {
    pub year: i32,
    pub week: i32,
    pub members: Vec<ArchivedMemberResponse>,
}

/// History lookup payload: a specific archived week when both query
/// parameters are supplied, otherwise the recently archived weeks.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum HistoryResponse {
    Weeks(Vec<SnapshotWeekResponse>),
    Week(ArchivedWeekResponse),
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityItem {
    pub repo: String,
    pub author: String,
    pub avatar_url: Option<String>,
    pub message: String,
    pub time: String,
    pub additions: i32,
    pub deletions: i32,
    pub commit_url: String,
    pub is_private: bool,
}

impl ActivityItem {
    /// Display form of one stored commit, with the trailer cleanup and
    /// privacy rules applied.
    pub fn new(commit: CommitRecord, is_private: bool, now: DateTime<Utc>) -> Self {
        Self {
            repo: commit.repo_name,
            author: commit.author_username,
            avatar_url: commit.author_avatar_url,
            message: aggregates::display_message(&commit.message, is_private),
            time: shared::format_relative(now, commit.pushed_at),
            additions: commit.additions,
            deletions: commit.deletions,
            commit_url: aggregates::display_url(&commit.commit_url, is_private),
            is_private,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityResponse {
    pub items: Vec<ActivityItem>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TopContributorResponse {
    pub username: String,
    pub avatar_url: Option<String>,
    pub commits: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RepoSummaryResponse {
    pub name: String,
    pub full_name: String,
    pub last_push_at: Option<DateTime<Utc>>,
    pub commits_this_week: i64,
    pub top_contributor_this_week: Option<TopContributorResponse>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RepoInfoResponse {
    pub name: String,
    pub full_name: String,
    pub last_push_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RepoDetailResponse {
    pub repo: RepoInfoResponse,
    pub recent_commits: Vec<ActivityItem>,
    pub top_contributors: Vec<LeaderboardMemberResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> CommitRecord {
        CommitRecord {
            id: "a1b2c3".to_string(),
            repo_name: "r1".to_string(),
            author_username: "alice".to_string(),
            author_avatar_url: None,
            message: message.to_string(),
            additions: 3,
            deletions: 1,
            commit_url: "https://github.com/acme/r1/commit/a1b2c3".to_string(),
            pushed_at: "2026-02-03T15:00:00Z".parse().unwrap(),
            created_at: "2026-02-03T15:00:05Z".parse().unwrap(),
        }
    }

    #[test]
    fn activity_item_surfaces_cleaned_public_commits() {
        let now = "2026-02-03T18:00:00Z".parse().unwrap();
        let item = ActivityItem::new(commit("fix bug\n\nCo-Authored-By: X <x@x>"), false, now);

        assert_eq!(item.message, "fix bug");
        assert_eq!(item.commit_url, "https://github.com/acme/r1/commit/a1b2c3");
        assert_eq!(item.time, "3h ago");
        assert!(!item.is_private);
    }

    #[test]
    fn activity_item_masks_private_commits() {
        let now = "2026-02-03T18:00:00Z".parse().unwrap();
        let item = ActivityItem::new(commit("fix bug\n\nCo-Authored-By: X <x@x>"), true, now);

        assert_eq!(item.message, aggregates::message_digest("fix bug"));
        assert_eq!(item.commit_url, "#");
        // Author, counts, and timing stay visible.
        assert_eq!(item.author, "alice");
        assert_eq!((item.additions, item.deletions), (3, 1));
    }

    #[test]
    fn pct_change_is_attached_to_comparisons() {
        let comparison = MetricComparison::new(50, 100);
        assert_eq!(comparison.change, -50);

        let from_nothing = MetricComparison::new(5, 0);
        assert_eq!(from_nothing.change, 100);
    }
}
