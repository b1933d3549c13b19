use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::cache::{Fetched, Source};
use crate::error::AppError;
use crate::models::{EventFilter, EventRequest};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

fn json_response(fetched: Fetched) -> Response {
    let cache_status = match fetched.source {
        Source::Cache => "HIT",
        Source::Upstream | Source::Coalesced => "MISS",
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static(CACHE_STATUS_HEADER),
                HeaderValue::from_static(cache_status),
            ),
        ],
        fetched.body,
    )
        .into_response()
}

#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Response, AppError> {
    let fetched = state.cache.get(EventRequest::Search(filter)).await?;
    Ok(json_response(fetched))
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Response, AppError> {
    let fetched = state.cache.get(EventRequest::Event(event_id)).await?;
    Ok(json_response(fetched))
}
