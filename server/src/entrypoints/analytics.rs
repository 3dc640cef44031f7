use chrono::Duration;
use rocket::{http::Status, serde::json::Json, State};
use shared::Calendar;

use super::types::{
    AnalyticsResponse, ContributorTrends, MetricComparison, MonthOverMonth, Velocity, WeekOverWeek,
};
use crate::aggregates;
use crate::db::DB;

const WEEKLY_CHART_WEEKS: i64 = 12;
const TOP_GROWING_REPOS: i64 = 3;

#[utoipa::path(context_path = "/api", responses(
    (status = 200, description = "Growth trends and comparisons", body = AnalyticsResponse)
))]
#[get("/analytics")]
pub async fn get_analytics(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<AnalyticsResponse>, Status> {
    match build_analytics(db, calendar).await {
        Ok(analytics) => Ok(Json(analytics)),
        Err(e) => {
            tracing::error!("Failed to build analytics: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_analytics(db: &DB, calendar: &Calendar) -> anyhow::Result<AnalyticsResponse> {
    let now = calendar.now();
    let week_start = calendar.week_start_at(now);
    let prev_week_start = week_start - Duration::weeks(1);
    let thirty_days_ago = now - Duration::days(30);
    let sixty_days_ago = now - Duration::days(60);
    let year_start = calendar.year_start_at(now);

    let current_week = db.window_stats(week_start, None).await?;
    let prev_week = db.window_stats(prev_week_start, Some(week_start)).await?;
    let current_month = db.window_stats(thirty_days_ago, None).await?;
    let prev_month = db
        .window_stats(sixty_days_ago, Some(thirty_days_ago))
        .await?;
    let ytd = db.window_stats(year_start, None).await?;

    let chart_daily = db
        .daily_commit_counts(
            week_start - Duration::weeks(WEEKLY_CHART_WEEKS - 1),
            calendar.offset_seconds(),
        )
        .await?;
    let weekly_chart = aggregates::weekly_series(&chart_daily, calendar);

    let ytd_daily = db
        .daily_commit_counts(year_start, calendar.offset_seconds())
        .await?;
    let cumulative_monthly = aggregates::cumulative_monthly_series(&ytd_daily);

    let new_this_month = db.count_new_contributors_since(thirty_days_ago).await?;
    let growth = db
        .repo_growth(week_start, prev_week_start, TOP_GROWING_REPOS)
        .await?;

    let net_lines = current_week.additions - current_week.deletions;
    let prev_net_lines = prev_week.additions - prev_week.deletions;

    Ok(AnalyticsResponse {
        wow: WeekOverWeek {
            commits: MetricComparison::new(current_week.commits, prev_week.commits),
            additions: MetricComparison::new(current_week.additions, prev_week.additions),
            deletions: MetricComparison::new(current_week.deletions, prev_week.deletions),
            contributors: MetricComparison::new(current_week.contributors, prev_week.contributors),
        },
        mom: MonthOverMonth {
            commits: MetricComparison::new(current_month.commits, prev_month.commits),
            additions: MetricComparison::new(current_month.additions, prev_month.additions),
            deletions: MetricComparison::new(current_month.deletions, prev_month.deletions),
        },
        ytd: ytd.into(),
        weekly_chart,
        velocity: Velocity {
            net_lines,
            prev_net_lines,
            change: aggregates::pct_change(net_lines, prev_net_lines),
            avg_commits_per_contributor: aggregates::avg_commits_per_contributor(
                current_week.commits,
                current_week.contributors,
            ),
        },
        contributor_trends: ContributorTrends {
            active_wow_change: aggregates::pct_change(
                current_week.contributors,
                prev_week.contributors,
            ),
            new_this_month,
        },
        top_growing_repos: growth.into_iter().map(Into::into).collect(),
        cumulative_monthly,
    })
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount("/api", routes![get_analytics])
    })
}
