use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod exam_routes;
pub mod slot_routes;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(slot_routes::router())
        .merge(appointment_routes::router())
        .merge(exam_routes::router());

    Router::new().nest("/api/v1", api).with_state(state)
}
