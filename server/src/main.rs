#[macro_use]
extern crate rocket;

mod aggregates;
mod backfill;
mod db;
mod entrypoints;
mod github_pull;
mod ingest;

use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use rocket::fairing::AdHoc;
use rocket_prometheus::PrometheusMetrics;
use shared::Calendar;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::github_pull::GithubClient;
use crate::ingest::IngestConfig;

pub const DEFAULT_TRACKED_REF: &str = "refs/heads/main";

#[derive(Debug, serde::Deserialize)]
pub struct Env {
    github_webhook_secret: String,
    github_token: String,
    github_org: String,
    tracked_ref: Option<String>,
    utc_offset_hours: Option<i32>,
    backfill_sleep_in_minutes: Option<u32>,
    repair_sleep_in_minutes: Option<u32>,
}

#[launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = envy::from_env::<Env>().expect("Failed to load environment variables");

    let calendar = match env.utc_offset_hours {
        Some(hours) => Calendar::from_offset_hours(hours).expect("Invalid UTC offset"),
        None => Calendar::default(),
    };
    let ingest_config = IngestConfig {
        webhook_secret: env.github_webhook_secret,
        tracked_ref: env
            .tracked_ref
            .unwrap_or_else(|| DEFAULT_TRACKED_REF.to_string()),
    };
    let github_client =
        GithubClient::new(env.github_token, env.github_org).expect("Failed to create GitHub client");

    let backfill_sleep =
        Duration::from_secs(env.backfill_sleep_in_minutes.unwrap_or(60) as u64 * 60);
    let repair_sleep = Duration::from_secs(env.repair_sleep_in_minutes.unwrap_or(30) as u64 * 60);
    let atomic_bool = Arc::new(AtomicBool::new(true));
    let atomic_bool_clone = atomic_bool.clone();

    let prometheus = PrometheusMetrics::new();
    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("Failed to build CORS options");

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();

    rocket::build()
        .manage(calendar)
        .manage(ingest_config)
        .attach(db::stage())
        .attach(github_pull::stage(
            github_client,
            repair_sleep,
            atomic_bool.clone(),
        ))
        .attach(backfill::stage(backfill_sleep, atomic_bool))
        .attach(entrypoints::stage())
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .attach(cors)
        .attach(AdHoc::on_shutdown("Stop background stages", |_| {
            Box::pin(async move {
                atomic_bool_clone.store(false, std::sync::atomic::Ordering::Relaxed);
            })
        }))
}
