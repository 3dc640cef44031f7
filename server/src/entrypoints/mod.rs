use rocket::fairing::AdHoc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod activity;
pub mod analytics;
pub mod leaderboard;
pub mod repos;
pub mod stats;
pub mod types;
pub mod webhook;

#[derive(OpenApi)]
#[openapi(
    paths(
        webhook::github_webhook,
        stats::get_stats,
        analytics::get_analytics,
        leaderboard::get_leaderboard,
        leaderboard::archive_snapshot,
        leaderboard::get_history,
        activity::get_activity,
        activity::get_heatmap,
        repos::get_repos,
        repos::get_repo_detail,
    ),
    components(schemas(
        types::MessageResponse,
        types::StatsResponse,
        types::WindowCounts,
        types::AnalyticsResponse,
        types::WeekOverWeek,
        types::MonthOverMonth,
        types::MetricComparison,
        types::Velocity,
        types::ContributorTrends,
        types::GrowingRepo,
        types::LeaderboardMemberResponse,
        types::SnapshotResponse,
        types::SnapshotWeekResponse,
        types::ArchivedMemberResponse,
        types::ArchivedWeekResponse,
        types::HistoryResponse,
        types::ActivityResponse,
        types::ActivityItem,
        types::RepoSummaryResponse,
        types::TopContributorResponse,
        types::RepoInfoResponse,
        types::RepoDetailResponse,
        crate::aggregates::HeatmapDay,
        crate::aggregates::WeekPoint,
        crate::aggregates::MonthPoint,
    ))
)]
struct ApiDoc;

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket
            .attach(webhook::stage())
            .attach(stats::stage())
            .attach(analytics::stage())
            .attach(leaderboard::stage())
            .attach(activity::stage())
            .attach(repos::stage())
            .mount(
                "/",
                SwaggerUi::new("/swagger-ui/<_..>").url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
}
