//! # Web Request Handlers

pub mod health;
pub mod webhooks;
