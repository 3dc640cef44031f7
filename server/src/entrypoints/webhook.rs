use std::sync::Arc;

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    response::status::Custom,
    serde::json::Json,
    Request, State,
};

use super::types::MessageResponse;
use crate::db::DB;
use crate::github_pull::GithubClient;
use crate::ingest::{self, IngestConfig, PushOutcome, PushPayload};

/// The two delivery headers the gateway authenticates and filters on.
pub struct WebhookHeaders<'r> {
    pub signature: Option<&'r str>,
    pub event: Option<&'r str>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WebhookHeaders<'r> {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(Self {
            signature: request.headers().get_one("X-Hub-Signature-256"),
            event: request.headers().get_one("X-GitHub-Event"),
        })
    }
}

fn respond(status: Status, message: impl Into<String>) -> Custom<Json<MessageResponse>> {
    Custom(status, Json(MessageResponse::new(message)))
}

#[utoipa::path(context_path = "/api/webhooks", responses(
    (status = 200, description = "Push processed, or event explicitly ignored", body = MessageResponse),
    (status = 401, description = "Missing or invalid signature", body = MessageResponse)
))]
#[post("/github", data = "<body>")]
pub async fn github_webhook(
    db: &State<DB>,
    github: &State<Arc<GithubClient>>,
    config: &State<IngestConfig>,
    headers: WebhookHeaders<'_>,
    body: &[u8],
) -> Custom<Json<MessageResponse>> {
    let Some(signature) = headers.signature else {
        return respond(Status::Unauthorized, "Missing signature");
    };
    if !ingest::verify_signature(&config.webhook_secret, body, signature) {
        return respond(Status::Unauthorized, "Invalid signature");
    }

    if headers.event != Some("push") {
        return respond(Status::Ok, "Event ignored");
    }

    let payload: PushPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Malformed push payload: {e}");
            return respond(Status::BadRequest, "Malformed payload");
        }
    };

    match ingest::process_push(db, github, &payload, &config.tracked_ref).await {
        Ok(PushOutcome::IgnoredRef) => respond(Status::Ok, "Non-tracked ref, ignored"),
        Ok(PushOutcome::Processed { total, inserted }) => respond(
            Status::Ok,
            format!("Processed {inserted} new of {total} commits"),
        ),
        Err(e) => {
            tracing::error!("Failed to process push: {e:#}");
            respond(Status::InternalServerError, "Internal server error")
        }
    }
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount("/api/webhooks", routes![github_webhook])
    })
}
