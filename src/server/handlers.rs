use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::AppState;
use crate::types::Step;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub code: String,
    #[serde(default)]
    pub step: Option<Step>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: impl Into<String>) -> HttpResponse {
    builder.json(ErrorBody {
        error: message.into(),
    })
}

/// POST /run
pub async fn run_code(state: web::Data<AppState>, payload: web::Json<RunRequest>) -> HttpResponse {
    let permit = match state.limiter.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(HttpResponse::ServiceUnavailable(), "server is shutting down");
        }
    };

    let engine = state.engine.clone();
    let code = payload.into_inner().code;
    let result = web::block(move || {
        let result = engine.execute(&code);
        drop(permit);
        result
    })
    .await;

    match result {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            error!(error = %e, "execution task failed");
            error_response(HttpResponse::InternalServerError(), "execution task failed")
        }
    }
}

/// POST /explain
pub async fn explain_code(state: web::Data<AppState>, payload: web::Json<ExplainRequest>) -> HttpResponse {
    let request = payload.into_inner();
    match state.explainer.explain(&request.code, request.step.as_ref()).await {
        Ok(explanation) => HttpResponse::Ok().json(ExplainResponse { explanation }),
        Err(e) => {
            warn!(error = %e, "explanation failed");
            error_response(HttpResponse::BadGateway(), e.to_string())
        }
    }
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Malformed or oversized JSON bodies answer with the same `{"error"}` shape
pub fn json_error(err: actix_web::error::JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    use actix_web::error::JsonPayloadError;

    let response = match &err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            error_response(HttpResponse::PayloadTooLarge(), err.to_string())
        }
        _ => error_response(HttpResponse::BadRequest(), err.to_string()),
    };
    actix_web::error::InternalError::from_response(err, response).into()
}
