//! Event endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use calbook_core::{Event, Period};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{user}/events", get(list_events))
        .route("/events", post(create_event))
        .route("/events/{id}", put(update_event).delete(remove_event))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_period")]
    pub period: Period,
    /// First day of the period; today (UTC) when omitted.
    pub date: Option<NaiveDate>,
}

fn default_period() -> Period {
    Period::Day
}

#[derive(Serialize)]
pub struct Created {
    pub id: String,
}

/// GET /users/{user}/events?period=day|week|month&date=YYYY-MM-DD
async fn list_events(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let mut events = state
        .calendar()
        .list_period(&user, query.period, date)
        .await?;
    events.sort_by_key(|event| event.start);
    Ok(Json(events))
}

/// POST /events - any `id` in the body is ignored
async fn create_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let id = state.calendar().create_event(&event).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// PUT /events/{id}
async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(event): Json<Event>,
) -> Result<StatusCode, AppError> {
    state.calendar().update_event(&id, &event).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /events/{id}
async fn remove_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.calendar().remove_event(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use calbook_core::storage::MemoryStorage;
    use chrono::{DateTime, Duration, TimeZone};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        router().with_state(AppState::new(MemoryStorage::new()))
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 2, 29, hour, 0, 0).unwrap()
    }

    fn event(title: &str, start_hour: u32, hours: i64) -> Event {
        Event::new(title, "kira", at(start_hour), Duration::hours(hours))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&Event>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(event) => request
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(event).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_then_list_day() {
        let app = app();

        let (status, body) = send(&app, "POST", "/events", Some(&event("focus", 15, 2))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", "/users/kira/events?period=day&date=2020-02-29", None).await;
        assert_eq!(status, StatusCode::OK);
        let events = body.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["id"], id.as_str());
        assert_eq!(events[0]["duration"], 7200);

        let (_, body) = send(&app, "GET", "/users/kira/events?period=day&date=2020-03-01", None).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlap_is_a_conflict() {
        let app = app();
        send(&app, "POST", "/events", Some(&event("focus", 15, 2))).await;

        let (status, body) = send(&app, "POST", "/events", Some(&event("call", 16, 2))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "This time is busy");

        let (status, _) = send(&app, "POST", "/events", Some(&event("call", 17, 2))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let app = app();
        let (_, body) = send(&app, "POST", "/events", Some(&event("focus", 9, 1))).await;
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "PUT", &format!("/events/{id}"), Some(&event("focus", 11, 1))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "PUT", "/events/missing", Some(&event("focus", 11, 1))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", &format!("/events/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "DELETE", &format!("/events/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&id));
    }

    #[tokio::test]
    async fn test_invalid_event_is_a_bad_request() {
        let app = app();
        let (status, body) = send(&app, "POST", "/events", Some(&event("", 9, 1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_duration_is_a_bad_request() {
        let app = app();
        let mut huge = event("marathon", 9, 1);
        huge.duration = Duration::try_seconds(9_000_000_000_000).unwrap();

        let (status, body) = send(&app, "POST", "/events", Some(&huge)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid event"));

        let (status, _) = send(&app, "POST", "/events", Some(&event("focus", 9, 1))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_unknown_period_is_rejected() {
        let app = app();
        let (status, _) = send(&app, "GET", "/users/kira/events?period=year", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
