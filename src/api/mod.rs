use rocket::Route;

pub mod auth;
mod common;
mod game;
mod sessions;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(game::routes());
    routes.extend(sessions::routes());
    routes.extend(auth::routes());
    routes
}
