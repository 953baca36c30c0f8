mod dto;
pub mod handlers;
pub mod llm;
pub mod naming;
pub mod sd;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::generation_routes()
}
