//! Thin HTTP routes over `gallery-core`'s services, mounted the way
//! thorium's `routes::{groups, images, ...}` modules each own one slice of
//! the router and expose a `pub fn mount(router) -> router`.

mod galleries;
mod gradient;
mod requests;
mod uploads;

use axum::Router;

use crate::AppState;

/// Mount every route module onto a fresh router
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    let router = galleries::mount(router);
    let router = uploads::mount(router);
    let router = gradient::mount(router);
    requests::mount(router)
}
