//! The dashboard — ratatui TUI presentation layer.
//!
//! ## Architecture (TEA)
//!
//! Model (`DashboardState`) + Update (`DashboardState::update`) + View
//! (`view::render`). All asynchronous producers feed one event channel;
//! the runner is its only consumer and the model's only mutator.

pub mod app;
pub mod event;
pub mod input;
pub mod layout;
pub mod runner;
pub mod screen;
pub mod view;
