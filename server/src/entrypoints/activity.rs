use std::collections::HashMap;

use rocket::{http::Status, serde::json::Json, State};
use shared::Calendar;

use super::types::{ActivityItem, ActivityResponse};
use crate::aggregates::{self, HeatmapDay};
use crate::db::DB;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;
/// The feed only ever serves the newest commits up to this many rows.
const FEED_CAP: i64 = 100;

#[utoipa::path(context_path = "/api/activity", responses(
    (status = 200, description = "Recent commit feed, cleaned and privacy-masked", body = ActivityResponse)
))]
#[get("/?<offset>&<limit>")]
pub async fn get_activity(
    db: &State<DB>,
    calendar: &State<Calendar>,
    offset: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<ActivityResponse>, Status> {
    let offset = offset.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match build_activity(db, calendar, offset, limit).await {
        Ok(activity) => Ok(Json(activity)),
        Err(e) => {
            tracing::error!("Failed to build activity feed: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_activity(
    db: &DB,
    calendar: &Calendar,
    offset: i64,
    limit: i64,
) -> anyhow::Result<ActivityResponse> {
    let now = calendar.now();
    let commits = db.recent_commits(limit, offset).await?;
    let privacy: HashMap<String, bool> = db
        .repo_privacy()
        .await?
        .into_iter()
        .map(|repo| (repo.name, repo.is_private))
        .collect();
    let total = db.count_all_commits().await?.min(FEED_CAP);

    let items = commits
        .into_iter()
        .map(|commit| {
            let is_private = privacy.get(&commit.repo_name).copied().unwrap_or(false);
            ActivityItem::new(commit, is_private, now)
        })
        .collect();

    Ok(ActivityResponse {
        items,
        total,
        has_more: offset + limit < total,
    })
}

#[utoipa::path(context_path = "/api/heatmap", responses(
    (status = 200, description = "Zero-filled daily commit counts for the business year", body = [HeatmapDay])
))]
#[get("/")]
pub async fn get_heatmap(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<Vec<HeatmapDay>>, Status> {
    match build_heatmap(db, calendar).await {
        Ok(series) => Ok(Json(series)),
        Err(e) => {
            tracing::error!("Failed to build heatmap: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_heatmap(db: &DB, calendar: &Calendar) -> anyhow::Result<Vec<HeatmapDay>> {
    let now = calendar.now();
    let (from, to) = calendar.year_range_at(now);
    let daily = db
        .daily_commit_counts(calendar.day_start(from), calendar.offset_seconds())
        .await?;
    Ok(aggregates::zero_filled_daily(&daily, from, to))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket
            .mount("/api/activity", routes![get_activity])
            .mount("/api/heatmap", routes![get_heatmap])
    })
}
