use std::collections::HashMap;

use itertools::Itertools;
use rocket::{http::Status, serde::json::Json, State};
use shared::Calendar;

use super::types::{
    ActivityItem, RepoDetailResponse, RepoInfoResponse, RepoSummaryResponse, TopContributorResponse,
};
use crate::db::types::RepoAuthorCountRecord;
use crate::db::DB;

const MAX_REPOS: i64 = 12;
const RECENT_COMMITS: i64 = 30;
const TOP_CONTRIBUTORS: i64 = 10;

struct RepoWeek {
    commits: i64,
    top: TopContributorResponse,
}

/// Fold per-repo per-author rows into weekly totals plus the top
/// contributor. Rows arrive ordered (repo, commits desc, username asc),
/// so the first row of each group is that repo's top contributor and
/// ties never reorder between calls.
fn weekly_by_repo(rows: Vec<RepoAuthorCountRecord>) -> HashMap<String, RepoWeek> {
    let mut weekly = HashMap::new();
    for (repo_name, group) in &rows.into_iter().chunk_by(|row| row.repo_name.clone()) {
        let mut commits = 0;
        let mut top = None;
        for row in group {
            commits += row.commits;
            if top.is_none() {
                top = Some(TopContributorResponse {
                    username: row.author_username,
                    avatar_url: row.author_avatar_url,
                    commits: row.commits,
                });
            }
        }
        if let Some(top) = top {
            weekly.insert(repo_name, RepoWeek { commits, top });
        }
    }
    weekly
}

#[utoipa::path(context_path = "/api/repos", responses(
    (status = 200, description = "Recently active repos with weekly counts", body = [RepoSummaryResponse])
))]
#[get("/")]
pub async fn get_repos(
    db: &State<DB>,
    calendar: &State<Calendar>,
) -> Result<Json<Vec<RepoSummaryResponse>>, Status> {
    match build_repos(db, calendar).await {
        Ok(repos) => Ok(Json(repos)),
        Err(e) => {
            tracing::error!("Failed to build repo list: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_repos(db: &DB, calendar: &Calendar) -> anyhow::Result<Vec<RepoSummaryResponse>> {
    let now = calendar.now();
    let repos = db.repos_by_recent_push(MAX_REPOS).await?;
    let rows = db
        .repo_author_counts_since(calendar.week_start_at(now))
        .await?;
    let mut weekly = weekly_by_repo(rows);

    Ok(repos
        .into_iter()
        .map(|repo| {
            let week = weekly.remove(&repo.name);
            RepoSummaryResponse {
                name: repo.name,
                full_name: repo.full_name,
                last_push_at: repo.last_push_at,
                commits_this_week: week.as_ref().map(|w| w.commits).unwrap_or(0),
                top_contributor_this_week: week.map(|w| w.top),
            }
        })
        .collect())
}

#[utoipa::path(context_path = "/api/repos", responses(
    (status = 200, description = "Repo detail with recent commits and contributors", body = RepoDetailResponse),
    (status = 404, description = "Unknown repo")
))]
#[get("/<name>")]
pub async fn get_repo_detail(
    db: &State<DB>,
    calendar: &State<Calendar>,
    name: &str,
) -> Result<Json<RepoDetailResponse>, Status> {
    match build_repo_detail(db, calendar, name).await {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(Status::NotFound),
        Err(e) => {
            tracing::error!("Failed to build repo detail for {name}: {e:#}");
            Err(Status::InternalServerError)
        }
    }
}

async fn build_repo_detail(
    db: &DB,
    calendar: &Calendar,
    name: &str,
) -> anyhow::Result<Option<RepoDetailResponse>> {
    let Some(repo) = db.get_repo(name).await? else {
        return Ok(None);
    };

    let now = calendar.now();
    let commits = db.repo_recent_commits(name, RECENT_COMMITS).await?;
    let top_contributors = db.repo_top_contributors(name, TOP_CONTRIBUTORS).await?;

    let is_private = repo.is_private;
    Ok(Some(RepoDetailResponse {
        repo: RepoInfoResponse {
            name: repo.name,
            full_name: repo.full_name,
            last_push_at: repo.last_push_at,
        },
        recent_commits: commits
            .into_iter()
            .map(|commit| ActivityItem::new(commit, is_private, now))
            .collect(),
        top_contributors: top_contributors.into_iter().map(Into::into).collect(),
    }))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount("/api/repos", routes![get_repos, get_repo_detail])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(repo: &str, author: &str, commits: i64) -> RepoAuthorCountRecord {
        RepoAuthorCountRecord {
            repo_name: repo.to_string(),
            author_username: author.to_string(),
            author_avatar_url: None,
            commits,
        }
    }

    #[test]
    fn weekly_fold_sums_commits_and_keeps_the_leading_author() {
        // SQL delivers rows ordered (repo, commits desc, username asc).
        let rows = vec![
            row("r1", "alice", 4),
            row("r1", "bob", 2),
            row("r2", "carol", 1),
        ];

        let weekly = weekly_by_repo(rows);
        let r1 = &weekly["r1"];
        assert_eq!(r1.commits, 6);
        assert_eq!(r1.top.username, "alice");
        assert_eq!(r1.top.commits, 4);
        assert_eq!(weekly["r2"].top.username, "carol");
    }

    #[test]
    fn weekly_fold_tie_break_follows_row_order_not_insertion_luck() {
        // Equal counts: the username-ascending row comes first and must
        // win every time.
        let rows = vec![row("r1", "alice", 3), row("r1", "bob", 3)];

        let weekly = weekly_by_repo(rows);
        assert_eq!(weekly["r1"].top.username, "alice");
        assert_eq!(weekly["r1"].commits, 6);
    }

    #[test]
    fn weekly_fold_is_empty_for_quiet_weeks() {
        assert!(weekly_by_repo(Vec::new()).is_empty());
    }
}
