pub mod auth;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod tmdb;
pub mod watchlists;
