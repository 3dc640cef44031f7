use chrono::{DateTime, Utc};
use rocket::{
    fairing::{self, AdHoc},
    Build, Rocket,
};
use rocket_db_pools::Database;
use sqlx::postgres::types::PgInterval;
use sqlx::PgPool;
use tracing::instrument;

#[derive(Database, Clone, Debug)]
#[database("commit-pulse")]
pub struct DB(PgPool);

pub mod types;

use types::{
    AvatarCheckRecord, CommitRecord, DailyCountRecord, LeaderboardRecord, NewCommit,
    NewWeeklyLeaderboardEntry, RepoAuthorCountRecord, RepoGrowthRecord, RepoPrivacyRecord,
    RepoRecord, SnapshotWeekRecord, StaleStatsRecord, WeeklyLeaderboardRecord, WindowStatsRecord,
};

/// Interval equal to the business-timezone offset, used to shift stored
/// UTC instants to local wall time before day-granularity grouping.
fn offset_interval(offset_seconds: i32) -> PgInterval {
    PgInterval {
        months: 0,
        days: 0,
        microseconds: offset_seconds as i64 * 1_000_000,
    }
}

impl DB {
    /// Insert-or-ignore keyed by the commit id. Returns whether a row
    /// was actually inserted; duplicate deliveries report `false` and
    /// must not touch contributor counters.
    #[instrument(skip(self, commit), fields(commit_id = %commit.id))]
    pub async fn insert_commit(&self, commit: &NewCommit) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (id, repo_name, author_username, author_avatar_url, message, additions, deletions, commit_url, pushed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&commit.id)
        .bind(&commit.repo_name)
        .bind(&commit.author_username)
        .bind(&commit.author_avatar_url)
        .bind(&commit.message)
        .bind(commit.additions)
        .bind(commit.deletions)
        .bind(&commit.commit_url)
        .bind(commit.pushed_at)
        .execute(&self.0)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// `last_push_at` only ever moves forward: a late-arriving older
    /// push never regresses it.
    #[instrument(skip(self))]
    pub async fn upsert_repo(
        &self,
        name: &str,
        full_name: &str,
        is_private: bool,
        observed_push: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repos (name, full_name, is_private, last_push_at, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (name) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                is_private = EXCLUDED.is_private,
                last_push_at = GREATEST(repos.last_push_at, EXCLUDED.last_push_at),
                updated_at = now()
            "#,
        )
        .bind(name)
        .bind(full_name)
        .bind(is_private)
        .bind(observed_push)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Contributor upsert for one freshly stored commit. Callers must
    /// couple this to a successful `insert_commit` so webhook
    /// redeliveries cannot inflate `total_commits`.
    #[instrument(skip(self))]
    pub async fn record_contribution(
        &self,
        username: &str,
        avatar_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contributors (username, avatar_url, total_commits, last_commit_at, updated_at)
            VALUES ($1, $2, 1, $3, now())
            ON CONFLICT (username) DO UPDATE
            SET total_commits = contributors.total_commits + 1,
                last_commit_at = GREATEST(contributors.last_commit_at, EXCLUDED.last_commit_at),
                avatar_url = COALESCE(EXCLUDED.avatar_url, contributors.avatar_url),
                updated_at = now()
            "#,
        )
        .bind(username)
        .bind(avatar_url)
        .bind(at)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_commit_stats(
        &self,
        id: &str,
        additions: i32,
        deletions: i32,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE commits SET additions = $2, deletions = $3 WHERE id = $1")
            .bind(id)
            .bind(additions)
            .bind(deletions)
            .execute(&self.0)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_commit_avatar(&self, id: &str, avatar_url: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE commits SET author_avatar_url = $2 WHERE id = $1")
            .bind(id)
            .bind(avatar_url)
            .execute(&self.0)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn commits_missing_stats(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<StaleStatsRecord>> {
        Ok(sqlx::query_as::<_, StaleStatsRecord>(
            r#"
            SELECT id, repo_name
            FROM commits
            WHERE additions = 0 AND deletions = 0 AND pushed_at >= $1
            ORDER BY pushed_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn recent_commits_for_avatar_check(
        &self,
        limit: i64,
    ) -> anyhow::Result<Vec<AvatarCheckRecord>> {
        Ok(sqlx::query_as::<_, AvatarCheckRecord>(
            r#"
            SELECT id, repo_name, author_username, author_avatar_url
            FROM commits
            ORDER BY pushed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    /// Commit/line/author rollup between `from` (inclusive) and `to`
    /// (exclusive); an open window when `to` is `None`.
    #[instrument(skip(self))]
    pub async fn window_stats(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> anyhow::Result<WindowStatsRecord> {
        let query = match to {
            Some(to) => sqlx::query_as::<_, WindowStatsRecord>(
                r#"
                SELECT count(*) AS commits,
                       coalesce(sum(additions), 0)::bigint AS additions,
                       coalesce(sum(deletions), 0)::bigint AS deletions,
                       count(DISTINCT author_username) AS contributors
                FROM commits
                WHERE pushed_at >= $1 AND pushed_at < $2
                "#,
            )
            .bind(from)
            .bind(to),
            None => sqlx::query_as::<_, WindowStatsRecord>(
                r#"
                SELECT count(*) AS commits,
                       coalesce(sum(additions), 0)::bigint AS additions,
                       coalesce(sum(deletions), 0)::bigint AS deletions,
                       count(DISTINCT author_username) AS contributors
                FROM commits
                WHERE pushed_at >= $1
                "#,
            )
            .bind(from),
        };

        Ok(query.fetch_one(&self.0).await?)
    }

    #[instrument(skip(self))]
    pub async fn count_commits_since(&self, from: DateTime<Utc>) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT count(*) FROM commits WHERE pushed_at >= $1")
                .bind(from)
                .fetch_one(&self.0)
                .await?,
        )
    }

    #[instrument(skip(self))]
    pub async fn count_all_commits(&self) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT count(*) FROM commits")
            .fetch_one(&self.0)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn count_active_repos_since(&self, from: DateTime<Utc>) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT count(DISTINCT name) FROM repos WHERE last_push_at >= $1",
        )
        .bind(from)
        .fetch_one(&self.0)
        .await?)
    }

    /// Contributors whose first commit ever falls inside the window.
    #[instrument(skip(self))]
    pub async fn count_new_contributors_since(&self, from: DateTime<Utc>) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT count(*) FROM (
                SELECT author_username, min(pushed_at) AS first_commit
                FROM commits
                GROUP BY author_username
            ) sub
            WHERE sub.first_commit >= $1
            "#,
        )
        .bind(from)
        .fetch_one(&self.0)
        .await?)
    }

    /// Per-local-day commit counts from `from` onward. Days without
    /// commits are absent; the aggregator zero-fills.
    #[instrument(skip(self))]
    pub async fn daily_commit_counts(
        &self,
        from: DateTime<Utc>,
        offset_seconds: i32,
    ) -> anyhow::Result<Vec<DailyCountRecord>> {
        Ok(sqlx::query_as::<_, DailyCountRecord>(
            r#"
            SELECT date(pushed_at AT TIME ZONE 'UTC' + $2) AS day,
                   count(*) AS commits
            FROM commits
            WHERE pushed_at >= $1
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(from)
        .bind(offset_interval(offset_seconds))
        .fetch_all(&self.0)
        .await?)
    }

    /// Author leaderboard for a window, commit count descending with a
    /// deterministic username tie-break.
    #[instrument(skip(self))]
    pub async fn leaderboard(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: i64,
    ) -> anyhow::Result<Vec<LeaderboardRecord>> {
        let query = match to {
            Some(to) => sqlx::query_as::<_, LeaderboardRecord>(
                r#"
                SELECT author_username AS username,
                       max(author_avatar_url) AS avatar_url,
                       count(*) AS commits,
                       coalesce(sum(additions), 0)::bigint AS additions,
                       coalesce(sum(deletions), 0)::bigint AS deletions
                FROM commits
                WHERE pushed_at >= $1 AND pushed_at < $2
                GROUP BY author_username
                ORDER BY count(*) DESC, author_username ASC
                LIMIT $3
                "#,
            )
            .bind(from)
            .bind(to)
            .bind(limit),
            None => sqlx::query_as::<_, LeaderboardRecord>(
                r#"
                SELECT author_username AS username,
                       max(author_avatar_url) AS avatar_url,
                       count(*) AS commits,
                       coalesce(sum(additions), 0)::bigint AS additions,
                       coalesce(sum(deletions), 0)::bigint AS deletions
                FROM commits
                WHERE pushed_at >= $1
                GROUP BY author_username
                ORDER BY count(*) DESC, author_username ASC
                LIMIT $2
                "#,
            )
            .bind(from)
            .bind(limit),
        };

        Ok(query.fetch_all(&self.0).await?)
    }

    /// Per-repo per-author commit counts since `from`, ordered so the
    /// first row of each repo group is its top contributor.
    #[instrument(skip(self))]
    pub async fn repo_author_counts_since(
        &self,
        from: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RepoAuthorCountRecord>> {
        Ok(sqlx::query_as::<_, RepoAuthorCountRecord>(
            r#"
            SELECT repo_name,
                   author_username,
                   max(author_avatar_url) AS author_avatar_url,
                   count(*) AS commits
            FROM commits
            WHERE pushed_at >= $1
            GROUP BY repo_name, author_username
            ORDER BY repo_name ASC, count(*) DESC, author_username ASC
            "#,
        )
        .bind(from)
        .fetch_all(&self.0)
        .await?)
    }

    /// Week-over-week commit growth per repo. Repos active in either
    /// week appear; a repo that went quiet shows negative growth.
    #[instrument(skip(self))]
    pub async fn repo_growth(
        &self,
        week_start: DateTime<Utc>,
        prev_week_start: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<RepoGrowthRecord>> {
        Ok(sqlx::query_as::<_, RepoGrowthRecord>(
            r#"
            WITH current_week AS (
                SELECT repo_name, count(*) AS commits
                FROM commits
                WHERE pushed_at >= $1
                GROUP BY repo_name
            ),
            prev_week AS (
                SELECT repo_name, count(*) AS commits
                FROM commits
                WHERE pushed_at >= $2 AND pushed_at < $1
                GROUP BY repo_name
            )
            SELECT coalesce(c.repo_name, p.repo_name) AS repo_name,
                   coalesce(c.commits, 0)::bigint AS current_commits,
                   coalesce(p.commits, 0)::bigint AS prev_commits,
                   coalesce(c.commits, 0)::bigint - coalesce(p.commits, 0)::bigint AS growth
            FROM current_week c
            FULL OUTER JOIN prev_week p ON c.repo_name = p.repo_name
            ORDER BY growth DESC, repo_name ASC
            LIMIT $3
            "#,
        )
        .bind(week_start)
        .bind(prev_week_start)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn recent_commits(
        &self,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<CommitRecord>> {
        Ok(sqlx::query_as::<_, CommitRecord>(
            r#"
            SELECT id, repo_name, author_username, author_avatar_url, message,
                   additions, deletions, commit_url, pushed_at, created_at
            FROM commits
            ORDER BY pushed_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn repo_recent_commits(
        &self,
        repo_name: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<CommitRecord>> {
        Ok(sqlx::query_as::<_, CommitRecord>(
            r#"
            SELECT id, repo_name, author_username, author_avatar_url, message,
                   additions, deletions, commit_url, pushed_at, created_at
            FROM commits
            WHERE repo_name = $1
            ORDER BY pushed_at DESC
            LIMIT $2
            "#,
        )
        .bind(repo_name)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn repo_top_contributors(
        &self,
        repo_name: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<LeaderboardRecord>> {
        Ok(sqlx::query_as::<_, LeaderboardRecord>(
            r#"
            SELECT author_username AS username,
                   max(author_avatar_url) AS avatar_url,
                   count(*) AS commits,
                   coalesce(sum(additions), 0)::bigint AS additions,
                   coalesce(sum(deletions), 0)::bigint AS deletions
            FROM commits
            WHERE repo_name = $1
            GROUP BY author_username
            ORDER BY count(*) DESC, author_username ASC
            LIMIT $2
            "#,
        )
        .bind(repo_name)
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_repo(&self, name: &str) -> anyhow::Result<Option<RepoRecord>> {
        Ok(sqlx::query_as::<_, RepoRecord>(
            r#"
            SELECT name, full_name, is_active, is_private, last_push_at
            FROM repos
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn repos_by_recent_push(&self, limit: i64) -> anyhow::Result<Vec<RepoRecord>> {
        Ok(sqlx::query_as::<_, RepoRecord>(
            r#"
            SELECT name, full_name, is_active, is_private, last_push_at
            FROM repos
            WHERE is_active = true
            ORDER BY last_push_at DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn repo_privacy(&self) -> anyhow::Result<Vec<RepoPrivacyRecord>> {
        Ok(
            sqlx::query_as::<_, RepoPrivacyRecord>("SELECT name, is_private FROM repos")
                .fetch_all(&self.0)
                .await?,
        )
    }

    #[instrument(skip(self))]
    pub async fn has_weekly_snapshot(&self, year: i32, week: i32) -> anyhow::Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM weekly_leaderboards WHERE year = $1 AND week = $2)",
        )
        .bind(year)
        .bind(week)
        .fetch_one(&self.0)
        .await?)
    }

    /// Archive one week's leaderboard. The UNIQUE (year, week, username)
    /// constraint backstops concurrent snapshot triggers.
    #[instrument(skip(self, entries))]
    pub async fn insert_weekly_snapshot(
        &self,
        entries: &[NewWeeklyLeaderboardEntry],
    ) -> anyhow::Result<u64> {
        let mut tx = self.0.begin().await?;
        let mut archived = 0;
        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO weekly_leaderboards (year, week, username, avatar_url, commits, additions, deletions, rank)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (year, week, username) DO NOTHING
                "#,
            )
            .bind(entry.year)
            .bind(entry.week)
            .bind(&entry.username)
            .bind(&entry.avatar_url)
            .bind(entry.commits)
            .bind(entry.additions)
            .bind(entry.deletions)
            .bind(entry.rank)
            .execute(tx.as_mut())
            .await?;
            archived += result.rows_affected();
        }
        tx.commit().await?;

        Ok(archived)
    }

    #[instrument(skip(self))]
    pub async fn weekly_snapshot(
        &self,
        year: i32,
        week: i32,
    ) -> anyhow::Result<Vec<WeeklyLeaderboardRecord>> {
        Ok(sqlx::query_as::<_, WeeklyLeaderboardRecord>(
            r#"
            SELECT year, week, username, avatar_url, commits, additions, deletions, rank, created_at
            FROM weekly_leaderboards
            WHERE year = $1 AND week = $2
            ORDER BY rank ASC
            "#,
        )
        .bind(year)
        .bind(week)
        .fetch_all(&self.0)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn recent_snapshot_weeks(&self, limit: i64) -> anyhow::Result<Vec<SnapshotWeekRecord>> {
        Ok(sqlx::query_as::<_, SnapshotWeekRecord>(
            r#"
            SELECT DISTINCT year, week
            FROM weekly_leaderboards
            ORDER BY year DESC, week DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.0)
        .await?)
    }
}

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    match DB::fetch(&rocket) {
        Some(db) => match sqlx::migrate!("./migrations").run(&**db).await {
            Ok(_) => Ok(rocket),
            Err(e) => {
                tracing::error!("Failed to initialize SQLx database: {}", e);
                Err(rocket)
            }
        },
        None => Err(rocket),
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async {
        rocket
            .attach(DB::init())
            .attach(AdHoc::try_on_ignite("SQLx Migrations", run_migrations))
    })
}
