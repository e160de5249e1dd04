use aerobook_core::{BookingError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err.kind() {
        ErrorKind::ValidationPrecondition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::BookingAlreadyExists | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::SessionExpired
        | ErrorKind::NoMatchFound
        | ErrorKind::UpstreamBusinessError
        | ErrorKind::Transient => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, kind) = match self {
            AppError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, None),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
            AppError::Anyhow(err) => match err.downcast_ref::<BookingError>() {
                Some(booking) => {
                    let status = booking_status(booking);
                    if status.is_server_error() {
                        tracing::error!("Booking failed: {}", booking);
                    }
                    (status, booking.to_string(), Some(booking.kind()))
                }
                None => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
