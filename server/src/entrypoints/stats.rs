use std::collections::HashSet;

use chrono::Duration;
use rocket::{http::Status, serde::json::Json, State};
use shared::Calendar;

use super::types::StatsResponse;
use crate::aggregates::{self, STREAK_LOOKBACK_DAYS};
use crate::db::DB;

#[utoipa::path(context_path = "/api", responses(
    (status = 200, description = "Live rollup counters", body = StatsResponse)
))]
#[get("/stats")]
pub async fn get_stats(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<StatsResponse>, Status> {
    match build_stats(db, calendar).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!("Failed to build stats: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_stats(db: &DB, calendar: &Calendar) -> anyhow::Result<StatsResponse> {
    let now = calendar.now();
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);

    let commits_today = db.count_commits_since(calendar.today_start_at(now)).await?;
    let week_stats = db.window_stats(week_ago, None).await?;
    let month_stats = db.window_stats(month_ago, None).await?;
    let active_repos = db.count_active_repos_since(week_ago).await?;
    let total_commits = db.count_all_commits().await?;

    let daily = db
        .daily_commit_counts(
            now - Duration::days(STREAK_LOOKBACK_DAYS),
            calendar.offset_seconds(),
        )
        .await?;
    let days_with_commits: HashSet<_> = daily
        .iter()
        .filter(|d| d.commits > 0)
        .map(|d| d.day)
        .collect();
    let team_streak = aggregates::streak(&days_with_commits, calendar.local_date(now));

    Ok(StatsResponse {
        commits_today,
        active_repos,
        team_streak,
        total_commits,
        active_contributors: week_stats.contributors,
        week_stats: week_stats.into(),
        month_stats: month_stats.into(),
    })
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount("/api", routes![get_stats])
    })
}
