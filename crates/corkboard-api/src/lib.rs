pub mod auth;
pub mod board;
pub mod error;
pub mod images;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod views;
