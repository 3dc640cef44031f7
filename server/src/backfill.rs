//! Periodic backfill origin: sweeps the organization's repositories and
//! feeds commits from the recent past through the same normalized
//! storage path as the webhook. Listing entries carry no diff stats;
//! the repair stage fills those in later.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use chrono::Utc;
use rocket::fairing::AdHoc;
use rocket_db_pools::Database;
use tracing::instrument;

use crate::db::DB;
use crate::github_pull::GithubClient;
use crate::ingest;

const BACKFILL_HORIZON_DAYS: i64 = 30;

#[instrument(skip(github, db))]
async fn backfill_commits(github: &GithubClient, db: &DB) -> anyhow::Result<()> {
    let since = Utc::now() - chrono::Duration::days(BACKFILL_HORIZON_DAYS);
    let repos = github.org_repos().await?;
    tracing::info!("Backfilling {} repositories from {}", repos.len(), github.org());

    for repo in repos {
        db.upsert_repo(&repo.name, &repo.full_name, repo.private, repo.pushed_at)
            .await?;

        // Empty or unreadable repos are skipped, not fatal.
        let commits = match github.repo_commits_since(&repo.name, since).await {
            Ok(commits) => commits,
            Err(e) => {
                tracing::warn!("Failed to list commits for {}: {e:#}", repo.name);
                continue;
            }
        };

        for commit in commits {
            let Some(normalized) = ingest::normalize_backfill_commit(&repo.name, &commit) else {
                continue;
            };
            if let Err(e) = ingest::store_commit(db, &normalized).await {
                tracing::warn!("Failed to store backfilled commit {}: {e:#}", normalized.id);
            }
        }
    }

    Ok(())
}

pub fn stage(sleep_duration: Duration, atomic_bool: Arc<AtomicBool>) -> AdHoc {
    AdHoc::on_ignite("Commit backfill", move |rocket| async move {
        rocket.attach(AdHoc::on_liftoff(
            "Backfills org commits every X minutes",
            move |rocket| {
                Box::pin(async move {
                    let db = DB::fetch(rocket)
                        .expect("Failed to get DB connection")
                        .clone();
                    let github_client: Arc<GithubClient> = rocket
                        .state()
                        .cloned()
                        .expect("Failed to get github client");
                    rocket::tokio::spawn(async move {
                        let mut interval = rocket::tokio::time::interval(sleep_duration);
                        while atomic_bool.load(std::sync::atomic::Ordering::Relaxed) {
                            interval.tick().await;

                            if let Err(e) = backfill_commits(&github_client, &db).await {
                                tracing::error!("Failed to backfill commits: {:#?}", e);
                            }
                        }
                    });
                })
            },
        ))
    })
}
