use crate::state::AppState;
use axum::Router;

pub mod authenticator;
mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod gateway;
pub mod handlers;
pub mod password;
pub mod remember;
pub mod session;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
