use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub repo_name: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub message: String,
    pub additions: i32,
    pub deletions: i32,
    pub commit_url: String,
    pub pushed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_private: bool,
    pub last_push_at: Option<DateTime<Utc>>,
}

/// Rollup of one time window: counts plus distinct authors.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, Default)]
pub struct WindowStatsRecord {
    pub commits: i64,
    pub additions: i64,
    pub deletions: i64,
    pub contributors: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    pub username: String,
    pub avatar_url: Option<String>,
    pub commits: i64,
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow, Serialize, Deserialize)]
pub struct DailyCountRecord {
    pub day: NaiveDate,
    pub commits: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RepoGrowthRecord {
    pub repo_name: String,
    pub current_commits: i64,
    pub prev_commits: i64,
    pub growth: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RepoAuthorCountRecord {
    pub repo_name: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub commits: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RepoPrivacyRecord {
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct WeeklyLeaderboardRecord {
    pub year: i32,
    pub week: i32,
    pub username: String,
    pub avatar_url: Option<String>,
    pub commits: i32,
    pub additions: i32,
    pub deletions: i32,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow, Serialize, Deserialize)]
pub struct SnapshotWeekRecord {
    pub year: i32,
    pub week: i32,
}

/// A commit whose additions/deletions never made it in; candidate for
/// the stats repair pass.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaleStatsRecord {
    pub id: String,
    pub repo_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AvatarCheckRecord {
    pub id: String,
    pub repo_name: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
}

/// A normalized commit ready for storage, produced by the ingestion
/// gateway from either the webhook or the backfill origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub id: String,
    pub repo_name: String,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub message: String,
    pub additions: i32,
    pub deletions: i32,
    pub commit_url: String,
    pub pushed_at: DateTime<Utc>,
}

/// New weekly leaderboard row to archive; `rank` is dense 1..N in the
/// leaderboard's order at archiving time.
#[derive(Debug, Clone)]
pub struct NewWeeklyLeaderboardEntry {
    pub year: i32,
    pub week: i32,
    pub username: String,
    pub avatar_url: Option<String>,
    pub commits: i32,
    pub additions: i32,
    pub deletions: i32,
    pub rank: i32,
}
