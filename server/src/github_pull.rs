//! GitHub collaborator client and the periodic repair stage that
//! patches commits whose stats or avatars were unavailable at ingestion
//! time. Both repairs rewrite externally observed truth and are safe to
//! run repeatedly.

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use rocket::fairing::AdHoc;
use rocket_db_pools::Database;
use serde::Deserialize;
use tracing::instrument;

use crate::db::DB;

/// Stats older than this are left alone; a commit that still has zero
/// counts after a week most likely really is empty.
const STATS_REPAIR_HORIZON_DAYS: i64 = 7;
const STATS_REPAIR_BATCH: i64 = 200;
const AVATAR_REPAIR_BATCH: i64 = 500;

#[derive(Debug, Clone)]
pub struct CommitStats {
    pub additions: i32,
    pub deletions: i32,
    pub author_avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSummary {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    stats: Option<CommitDetailStats>,
    #[serde(default)]
    author: Option<AccountSummary>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct CommitDetailStats {
    #[serde(default)]
    additions: i64,
    #[serde(default)]
    deletions: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrgRepoSummary {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoCommitSummary {
    pub sha: String,
    pub commit: GitCommitSummary,
    #[serde(default)]
    pub author: Option<AccountSummary>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitCommitSummary {
    pub message: String,
    #[serde(default)]
    pub author: Option<GitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

pub struct GithubClient {
    octocrab: Octocrab,
    org: String,
}

impl GithubClient {
    pub fn new(github_token: String, org: String) -> anyhow::Result<Self> {
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(github_token)
            .build()?;
        Ok(Self { octocrab, org })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Per-commit diff stats and the canonical author avatar.
    #[instrument(skip(self))]
    pub async fn commit_stats(&self, repo: &str, sha: &str) -> anyhow::Result<CommitStats> {
        let detail: CommitDetail = self
            .octocrab
            .get(
                format!("/repos/{}/{}/commits/{}", self.org, repo, sha),
                None::<&()>,
            )
            .await?;

        let stats = detail.stats.unwrap_or_default();
        Ok(CommitStats {
            additions: stats.additions as i32,
            deletions: stats.deletions as i32,
            author_avatar_url: detail.author.and_then(|author| author.avatar_url),
        })
    }

    #[instrument(skip(self))]
    pub async fn org_repos(&self) -> anyhow::Result<Vec<OrgRepoSummary>> {
        Ok(self
            .octocrab
            .get(
                format!("/orgs/{}/repos?per_page=100&sort=updated", self.org),
                None::<&()>,
            )
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn repo_commits_since(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RepoCommitSummary>> {
        Ok(self
            .octocrab
            .get(
                format!(
                    "/repos/{}/{}/commits?per_page=100&since={}",
                    self.org,
                    repo,
                    since.to_rfc3339()
                ),
                None::<&()>,
            )
            .await?)
    }
}

#[instrument(skip(github, db))]
async fn repair_commit_stats(github: &GithubClient, db: &DB) -> anyhow::Result<()> {
    let since = Utc::now() - chrono::Duration::days(STATS_REPAIR_HORIZON_DAYS);
    let stale = db.commits_missing_stats(since, STATS_REPAIR_BATCH).await?;
    for record in stale {
        let stats = match github.commit_stats(&record.repo_name, &record.id).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch stats for {}/{}: {e:#}",
                    record.repo_name,
                    record.id
                );
                continue;
            }
        };
        if stats.additions != 0 || stats.deletions != 0 {
            db.update_commit_stats(&record.id, stats.additions, stats.deletions)
                .await?;
        }
    }
    Ok(())
}

#[instrument(skip(github, db))]
async fn repair_avatars(github: &GithubClient, db: &DB) -> anyhow::Result<()> {
    let commits = db.recent_commits_for_avatar_check(AVATAR_REPAIR_BATCH).await?;
    for record in commits {
        let stats = match github.commit_stats(&record.repo_name, &record.id).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch avatar for {}/{}: {e:#}",
                    record.repo_name,
                    record.id
                );
                continue;
            }
        };
        match stats.author_avatar_url {
            Some(canonical) if Some(canonical.as_str()) != record.author_avatar_url.as_deref() => {
                db.update_commit_avatar(&record.id, &canonical).await?;
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn stage(
    github_client: GithubClient,
    sleep_duration: Duration,
    atomic_bool: Arc<AtomicBool>,
) -> AdHoc {
    AdHoc::on_ignite("GitHub commit repair", move |rocket| async move {
        rocket
            .manage(Arc::new(github_client))
            .attach(AdHoc::on_liftoff(
                "Repairs commit stats and avatars every X minutes",
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

                                if let Err(e) = repair_commit_stats(&github_client, &db).await {
                                    tracing::error!("Failed to repair commit stats: {:#?}", e);
                                }

                                if let Err(e) = repair_avatars(&github_client, &db).await {
                                    tracing::error!("Failed to repair avatars: {:#?}", e);
                                }
                            }
                        });
                    })
                },
            ))
    })
}
