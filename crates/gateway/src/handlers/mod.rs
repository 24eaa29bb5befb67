//! Request handlers for the API Gateway

pub mod auth;
pub mod chat;
pub mod health;
pub mod status;
