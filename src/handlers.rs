use actix_web::{error::JsonPayloadError, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::message_database::MessageDatabase;

const CREATE_REJECTED: &str = "name and content must not be empty";
const NAME_REQUIRED: &str = "name is required";

const BODY_LIMIT: usize = 100 * 1024;

/// Body of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Envelope {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct CreateMessageTdo {
    name: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize)]
struct RetractMessageTdo {
    name: Option<String>,
}

#[derive(Serialize)]
struct HealthTdo {
    status: &'static str,
    messages: usize,
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

// Store calls read and fsync the dump file, so they run on the blocking pool.
async fn list_messages(db: web::Data<MessageDatabase>) -> Result<HttpResponse, ApiError> {
    let messages = web::block(move || db.list()).await??;
    Ok(HttpResponse::Ok().json(Envelope::data(messages)))
}

async fn create_message(
    form: web::Json<CreateMessageTdo>,
    db: web::Data<MessageDatabase>,
) -> Result<HttpResponse, ApiError> {
    let CreateMessageTdo { name, content } = form.into_inner();
    let (name, content) = match (non_empty(name), non_empty(content)) {
        (Some(name), Some(content)) => (name, content),
        _ => return Err(ApiError::Validation(CREATE_REJECTED.to_string())),
    };

    let message = web::block(move || db.append(&name, &content)).await??;
    tracing::info!(id = %message.id, name = %message.name, "message created");
    Ok(HttpResponse::Ok().json(Envelope::data(message)))
}

async fn retract_message(
    id: web::Path<String>,
    form: web::Json<RetractMessageTdo>,
    db: web::Data<MessageDatabase>,
) -> Result<HttpResponse, ApiError> {
    let name = non_empty(form.into_inner().name)
        .ok_or_else(|| ApiError::Validation(NAME_REQUIRED.to_string()))?;

    let id = id.into_inner();
    let removed = web::block(move || db.remove_if_authorized(&id, &name)).await??;
    tracing::info!(id = %removed.id, "message retracted");
    Ok(HttpResponse::Ok().json(Envelope::<()>::done("message retracted")))
}

async fn health(db: web::Data<MessageDatabase>) -> Result<HttpResponse, ApiError> {
    let messages = web::block(move || db.len()).await??;
    Ok(HttpResponse::Ok().json(Envelope::data(HealthTdo {
        status: "ok",
        messages,
    })))
}

// Apart from an oversized one, a body that cannot be read counts as one
// without the required fields.
fn json_config(rejection: &'static str) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(BODY_LIMIT)
        .error_handler(move |err, _req| {
            tracing::debug!(error = %err, "unreadable request body");
            match err {
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    ApiError::TooLarge(BODY_LIMIT).into()
                }
                _ => ApiError::Validation(rejection.to_string()).into(),
            }
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .service(
                web::resource("/messages")
                    .app_data(json_config(CREATE_REJECTED))
                    .route(web::get().to(list_messages))
                    .route(web::post().to(create_message)),
            )
            .service(
                web::resource("/messages/{id}")
                    .app_data(json_config(NAME_REQUIRED))
                    .route(web::delete().to(retract_message)),
            ),
    );
}
