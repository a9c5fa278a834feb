pub mod auth;
pub mod dashboard;
pub mod market;
pub mod users;
