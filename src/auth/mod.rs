use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod revocation;
pub mod services;

pub(crate) use dto::validate_password;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
