//! Time entries and the running-timer rules.

pub mod dto;
pub mod engine;
pub mod handlers;
pub mod model;

use axum::Router;

use crate::state::AppState;

pub use engine::TimeEntryEngine;
pub use model::TimeEntry;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
