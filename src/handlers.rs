use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info};

use crate::activation::{Activation, ActivationFailure};
use crate::marketing::platform_info;
use crate::model::{ActivationRequest, ActivationResult, ActivationStatus, FieldError};
use crate::server::{json_error, AppState};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn platform(State(state): State<AppState>) -> Response {
    Json(platform_info(state.platform)).into_response()
}

pub async fn activate(
    State(state): State<AppState>,
    body: Result<Json<ActivationRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(JsonRejection::JsonDataError(err)) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "validation_error",
                    "activation_id": null,
                    "detail": [body_field_error(&err.body_text())],
                })),
            )
                .into_response()
        }
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
        }
    };
    let activation = state.activator.activate(&req).await;
    activation_response(activation)
}

/// Pull the offending field out of a serde message: either a missing field
/// or a `path: reason` prefix. Anything else is attributed to `body`.
fn body_field_error(message: &str) -> FieldError {
    let detail = message
        .split_once("target type: ")
        .map_or(message, |(_, rest)| rest);
    let missing = detail
        .split_once("missing field `")
        .and_then(|(_, rest)| rest.split_once('`'))
        .map(|(field, _)| field);
    if let Some(field) = missing {
        return FieldError::new(field, format!("{field} is required"));
    }
    let is_path = |p: &str| {
        !p.is_empty()
            && p.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
    };
    match detail.split_once(": ") {
        Some((path, reason)) if is_path(path) => FieldError::new(path, reason),
        _ => FieldError::new("body", detail),
    }
}

/// Map a finished activation onto its HTTP status and body.
pub fn activation_response(activation: Activation) -> Response {
    let Activation { log, failure } = activation;
    match failure {
        None => {
            let status = match log.status {
                ActivationStatus::Completed => StatusCode::OK,
                _ => StatusCode::ACCEPTED,
            };
            (status, Json(ActivationResult::from(&log))).into_response()
        }
        Some(ActivationFailure::Validation(detail)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "validation_error",
                "activation_id": log.activation_id,
                "detail": detail,
            })),
        )
            .into_response(),
        Some(failure @ ActivationFailure::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "not_found",
                "activation_id": log.activation_id,
                "message": failure.to_string(),
            })),
        )
            .into_response(),
        Some(failure @ ActivationFailure::Source(_)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "content_source_error",
                "activation_id": log.activation_id,
                "message": failure.to_string(),
            })),
        )
            .into_response(),
    }
}

pub async fn latest_activation(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Response {
    match state.activator.latest(&entry_id).await {
        Ok(Some(log)) => Json(log).into_response(),
        Ok(None) => {
            info!(%entry_id, "no activation log recorded");
            json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no activation log for entry '{entry_id}'"),
            )
        }
        Err(err) => {
            error!(%entry_id, error = %err, "failed to read activation log");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "audit_error", err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_is_named() {
        let err = body_field_error(
            "Failed to deserialize the JSON body into the target type: missing field `marketo_list_id` at line 1 column 29",
        );
        assert_eq!(err.field, "marketo_list_id");
        assert_eq!(err.reason, "marketo_list_id is required");
    }

    #[test]
    fn mistyped_field_keeps_serde_reason() {
        let err = body_field_error(
            "Failed to deserialize the JSON body into the target type: enrichment_enabled: invalid type: string \"yes\", expected a boolean at line 1 column 70",
        );
        assert_eq!(err.field, "enrichment_enabled");
        assert!(err.reason.starts_with("invalid type"));
    }

    #[test]
    fn unattributable_error_falls_back_to_body() {
        let err = body_field_error("invalid type: sequence, expected struct ActivationRequest");
        assert_eq!(err.field, "body");
    }
}
