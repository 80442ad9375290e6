/// State management module
///
/// This module handles all application state, including:
/// - Detection result types shared with the backend (data.rs)
/// - The view state machine: source, channel, predictions, flags (session.rs)
/// - Client configuration and backend endpoints (config.rs)

pub mod config;
pub mod data;
pub mod session;
