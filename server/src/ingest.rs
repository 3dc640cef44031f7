//! Ingestion gateway: authenticates push notifications, filters them
//! down to tracked-branch pushes, and turns each commit into durable
//! rows. Both origins (live webhook, periodic backfill) feed the same
//! normalized storage path.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::instrument;

use crate::db::types::NewCommit;
use crate::db::DB;
use crate::github_pull::{CommitStats, GithubClient, RepoCommitSummary};

/// Per-commit budget for the best-effort stats enrichment call. An
/// unreachable collaborator API must not stall the rest of the batch.
pub const ENRICH_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway settings shared by the webhook entrypoint: the HMAC secret
/// and the single ref whose pushes are recorded.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub webhook_secret: String,
    pub tracked_ref: String,
}

type HmacSha256 = Hmac<Sha256>;

/// Verify the `X-Hub-Signature-256` digest over the raw payload bytes.
/// The comparison runs in constant time via `Mac::verify_slice`.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
    pub pusher: Pusher,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<FixedOffset>,
    pub url: String,
    #[serde(default)]
    pub author: Option<PushCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PushCommitAuthor {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Push to a ref we do not track; accepted, nothing written.
    IgnoredRef,
    Processed { total: usize, inserted: usize },
}

/// Author identity: the VCS-reported username when present, otherwise
/// the pusher.
fn resolve_author(commit: &PushCommit, pusher: &Pusher) -> String {
    commit
        .author
        .as_ref()
        .and_then(|author| author.username.clone())
        .unwrap_or_else(|| pusher.name.clone())
}

/// Build the storable commit from a webhook push. Enrichment stats are
/// optional; without them the commit lands with zero counts and the
/// pusher's avatar, and the repair pass fills the gap later.
pub fn normalize_webhook_commit(
    payload: &PushPayload,
    commit: &PushCommit,
    stats: Option<&CommitStats>,
) -> NewCommit {
    let fallback_avatar = payload
        .sender
        .as_ref()
        .and_then(|sender| sender.avatar_url.clone());
    let author_avatar_url = stats
        .and_then(|stats| stats.author_avatar_url.clone())
        .or(fallback_avatar);

    NewCommit {
        id: commit.id.clone(),
        repo_name: payload.repository.name.clone(),
        author_username: resolve_author(commit, &payload.pusher),
        author_avatar_url,
        message: commit.message.clone(),
        additions: stats.map(|stats| stats.additions).unwrap_or(0),
        deletions: stats.map(|stats| stats.deletions).unwrap_or(0),
        commit_url: commit.url.clone(),
        pushed_at: commit.timestamp.with_timezone(&Utc),
    }
}

/// Build the storable commit from a backfill listing entry. Backfill
/// only keeps the message's first line and always starts with zero
/// stats; the repair pass supplies them.
pub fn normalize_backfill_commit(repo_name: &str, commit: &RepoCommitSummary) -> Option<NewCommit> {
    if commit.sha.is_empty() || commit.commit.message.is_empty() {
        return None;
    }

    let author_username = commit
        .author
        .as_ref()
        .and_then(|author| author.login.clone())
        .or_else(|| {
            commit
                .commit
                .author
                .as_ref()
                .and_then(|author| author.name.clone())
        })
        .unwrap_or_else(|| "unknown".to_string());

    Some(NewCommit {
        id: commit.sha.clone(),
        repo_name: repo_name.to_string(),
        author_username,
        author_avatar_url: commit
            .author
            .as_ref()
            .and_then(|author| author.avatar_url.clone()),
        message: commit
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
        additions: 0,
        deletions: 0,
        commit_url: commit.html_url.clone(),
        pushed_at: commit
            .commit
            .author
            .as_ref()
            .and_then(|author| author.date)
            .unwrap_or_else(Utc::now),
    })
}

/// Store one normalized commit. The contributor counter is only touched
/// when the insert actually created a row, so redeliveries are full
/// no-ops.
pub async fn store_commit(db: &DB, commit: &NewCommit) -> anyhow::Result<bool> {
    let inserted = db.insert_commit(commit).await?;
    if inserted {
        db.record_contribution(
            &commit.author_username,
            commit.author_avatar_url.as_deref(),
            commit.pushed_at,
        )
        .await?;
    }
    Ok(inserted)
}

/// Apply one authenticated push: upsert the repo, then process commits
/// in payload order. Enrichment failures degrade to defaults; a store
/// failure mid-batch propagates with prior commits retained.
#[instrument(skip(db, github, payload), fields(repo = %payload.repository.name))]
pub async fn process_push(
    db: &DB,
    github: &GithubClient,
    payload: &PushPayload,
    tracked_ref: &str,
) -> anyhow::Result<PushOutcome> {
    if payload.git_ref != tracked_ref {
        return Ok(PushOutcome::IgnoredRef);
    }

    db.upsert_repo(
        &payload.repository.name,
        &payload.repository.full_name,
        payload.repository.private,
        Some(Utc::now()),
    )
    .await?;

    let mut inserted = 0;
    for commit in &payload.commits {
        let stats = fetch_stats(github, &payload.repository.name, &commit.id).await;
        let normalized = normalize_webhook_commit(payload, commit, stats.as_ref());
        if store_commit(db, &normalized).await? {
            inserted += 1;
        }
    }

    Ok(PushOutcome::Processed {
        total: payload.commits.len(),
        inserted,
    })
}

async fn fetch_stats(github: &GithubClient, repo: &str, sha: &str) -> Option<CommitStats> {
    match rocket::tokio::time::timeout(ENRICH_TIMEOUT, github.commit_stats(repo, sha)).await {
        Ok(Ok(stats)) => Some(stats),
        Ok(Err(e)) => {
            tracing::warn!("Failed to fetch stats for commit {repo}@{sha}: {e:#}");
            None
        }
        Err(_) => {
            tracing::warn!("Timed out fetching stats for commit {repo}@{sha}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = signed("s3cret", body);

        assert!(verify_signature("s3cret", body, &header));
        assert!(!verify_signature("wrong-secret", body, &header));
        assert!(!verify_signature("s3cret", b"tampered body", &header));
    }

    #[test]
    fn signature_rejects_malformed_headers() {
        let body = b"payload";
        assert!(!verify_signature("s3cret", body, ""));
        assert!(!verify_signature("s3cret", body, "sha1=abcdef"));
        assert!(!verify_signature("s3cret", body, "sha256=not-hex"));
        assert!(!verify_signature("s3cret", body, "sha256="));
    }

    fn sample_payload() -> PushPayload {
        serde_json::from_str(
            r#"{
                "ref": "refs/heads/main",
                "repository": {
                    "name": "r1",
                    "full_name": "acme/r1",
                    "private": false,
                    "owner": {"login": "acme"}
                },
                "pusher": {"name": "octopusher"},
                "sender": {"avatar_url": "https://avatars.example/pusher.png"},
                "commits": [
                    {
                        "id": "a1b2c3",
                        "message": "fix bug\n\nCo-Authored-By: X <x@x>",
                        "timestamp": "2026-02-03T10:00:00-05:00",
                        "url": "https://github.com/acme/r1/commit/a1b2c3",
                        "author": {"username": "alice", "name": "Alice"}
                    },
                    {
                        "id": "d4e5f6",
                        "message": "add feature",
                        "timestamp": "2026-02-03T10:05:00-05:00",
                        "url": "https://github.com/acme/r1/commit/d4e5f6",
                        "author": {"name": "Bob"}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn webhook_payload_parses_and_keeps_commit_order() {
        let payload = sample_payload();
        assert_eq!(payload.git_ref, "refs/heads/main");
        assert_eq!(payload.commits.len(), 2);
        assert_eq!(payload.commits[0].id, "a1b2c3");
        assert_eq!(payload.commits[1].id, "d4e5f6");
    }

    #[test]
    fn author_prefers_commit_identity_and_falls_back_to_pusher() {
        let payload = sample_payload();

        let first = normalize_webhook_commit(&payload, &payload.commits[0], None);
        assert_eq!(first.author_username, "alice");
        // The full message is stored; trailer stripping is display-time.
        assert_eq!(first.message, "fix bug\n\nCo-Authored-By: X <x@x>");

        // Second commit has no VCS username, so the pusher wins.
        let second = normalize_webhook_commit(&payload, &payload.commits[1], None);
        assert_eq!(second.author_username, "octopusher");
    }

    #[test]
    fn enrichment_attaches_stats_and_canonical_avatar() {
        let payload = sample_payload();
        let stats = CommitStats {
            additions: 3,
            deletions: 1,
            author_avatar_url: Some("https://avatars.example/alice.png".to_string()),
        };

        let commit = normalize_webhook_commit(&payload, &payload.commits[0], Some(&stats));
        assert_eq!(commit.additions, 3);
        assert_eq!(commit.deletions, 1);
        assert_eq!(
            commit.author_avatar_url.as_deref(),
            Some("https://avatars.example/alice.png")
        );
        assert_eq!(commit.pushed_at, "2026-02-03T15:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
    }

    #[test]
    fn missing_enrichment_degrades_to_zeros_and_pusher_avatar() {
        let payload = sample_payload();

        let commit = normalize_webhook_commit(&payload, &payload.commits[1], None);
        assert_eq!(commit.additions, 0);
        assert_eq!(commit.deletions, 0);
        assert_eq!(
            commit.author_avatar_url.as_deref(),
            Some("https://avatars.example/pusher.png")
        );
        assert_eq!(commit.message, "add feature");
    }

    #[test]
    fn backfill_commit_keeps_first_message_line_with_zero_stats() {
        let listing: RepoCommitSummary = serde_json::from_str(
            r#"{
                "sha": "ff00aa",
                "commit": {
                    "message": "chore: bump deps\n\nlong body",
                    "author": {"name": "Carol", "date": "2026-01-20T09:00:00Z"}
                },
                "author": {"login": "carol", "avatar_url": "https://avatars.example/carol.png"},
                "html_url": "https://github.com/acme/r2/commit/ff00aa"
            }"#,
        )
        .unwrap();

        let commit = normalize_backfill_commit("r2", &listing).unwrap();
        assert_eq!(commit.id, "ff00aa");
        assert_eq!(commit.message, "chore: bump deps");
        assert_eq!(commit.author_username, "carol");
        assert_eq!(commit.additions, 0);
        assert_eq!(commit.deletions, 0);
        assert_eq!(commit.pushed_at, "2026-01-20T09:00:00Z".parse::<chrono::DateTime<chrono::Utc>>().unwrap());
    }

    #[test]
    fn backfill_commit_without_listing_author_uses_git_signature() {
        let listing: RepoCommitSummary = serde_json::from_str(
            r#"{
                "sha": "ff00ab",
                "commit": {
                    "message": "initial import",
                    "author": {"name": "Carol", "date": "2026-01-20T09:00:00Z"}
                },
                "author": null,
                "html_url": "https://github.com/acme/r2/commit/ff00ab"
            }"#,
        )
        .unwrap();

        let commit = normalize_backfill_commit("r2", &listing).unwrap();
        assert_eq!(commit.author_username, "Carol");
        assert_eq!(commit.author_avatar_url, None);
    }
}
