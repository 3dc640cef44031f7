use rocket::{http::Status, serde::json::Json, State};
use shared::{Calendar, IsoWeek};

use super::types::{
    ArchivedWeekResponse, HistoryResponse, LeaderboardMemberResponse, SnapshotResponse,
};
use crate::aggregates;
use crate::db::DB;

const LEADERBOARD_SIZE: i64 = 10;
const HISTORY_WEEKS: i64 = 20;

#[utoipa::path(context_path = "/api/leaderboard", responses(
    (status = 200, description = "Current-week top contributors", body = [LeaderboardMemberResponse])
))]
#[get("/")]
pub async fn get_leaderboard(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<Vec<LeaderboardMemberResponse>>, Status> {
    let week_start = calendar.week_start_at(calendar.now());
    match db.leaderboard(week_start, None, LEADERBOARD_SIZE).await {
        Ok(board) => Ok(Json(board.into_iter().map(Into::into).collect())),
        Err(e) => {
            tracing::error!("Failed to build leaderboard: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

#[utoipa::path(context_path = "/api/leaderboard", responses(
    (status = 200, description = "Archive outcome, including explicit no-ops", body = SnapshotResponse)
))]
#[post("/snapshot")]
pub async fn archive_snapshot(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<SnapshotResponse>, Status> {
    match build_snapshot(db, calendar).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            tracing::error!("Failed to archive weekly leaderboard: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_snapshot(db: &DB, calendar: &Calendar) -> anyhow::Result<SnapshotResponse> {
    let now = calendar.now();
    let IsoWeek { year, week } = calendar.iso_week_at(now);
    let week = week as i32;

    // Caller-side idempotency; the (year, week, username) constraint
    // backstops concurrent triggers.
    if db.has_weekly_snapshot(year, week).await? {
        return Ok(SnapshotResponse::skipped(format!(
            "Week {week} of {year} is already archived"
        )));
    }

    let board = db
        .leaderboard(calendar.week_start_at(now), None, LEADERBOARD_SIZE)
        .await?;
    if board.is_empty() {
        return Ok(SnapshotResponse::skipped("No commits this week"));
    }

    let entries = aggregates::archive_entries(&board, year, week);
    let members_archived = db.insert_weekly_snapshot(&entries).await?;

    Ok(SnapshotResponse::archived(year, week, members_archived))
}

#[utoipa::path(context_path = "/api/leaderboard", responses(
    (status = 200, description = "Archived week, or the recently archived weeks", body = HistoryResponse),
    (status = 404, description = "No archive for the requested week")
))]
#[get("/history?<year>&<week>")]
pub async fn get_history(
    db: &State<DB>,
    year: Option<i32>,
    week: Option<i32>,
) -> Result<Json<HistoryResponse>, Status> {
    match build_history(db, year, week).await {
        Ok(Some(history)) => Ok(Json(history)),
        Ok(None) => Err(Status::NotFound),
        Err(e) => {
            tracing::error!("Failed to fetch leaderboard history: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_history(
    db: &DB,
    year: Option<i32>,
    week: Option<i32>,
) -> anyhow::Result<Option<HistoryResponse>> {
    let (Some(year), Some(week)) = (year, week) else {
        let weeks = db.recent_snapshot_weeks(HISTORY_WEEKS).await?;
        return Ok(Some(HistoryResponse::Weeks(
            weeks.into_iter().map(Into::into).collect(),
        )));
    };

    let members = db.weekly_snapshot(year, week).await?;
    if members.is_empty() {
        return Ok(None);
    }

    Ok(Some(HistoryResponse::Week(ArchivedWeekResponse {
        year,
        week,
        members: members.into_iter().map(Into::into).collect(),
    })))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount(
            "/api/leaderboard",
            routes![get_leaderboard, archive_snapshot, get_history],
        )
    })
}
