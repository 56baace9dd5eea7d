//! Civic issue reporting: a local store of citizen reports with the
//! dashboard pipeline, optimistic upvotes, geocoding and a chat assistant.

pub mod chatbot;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod geocode;
pub mod leaderboard;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod upvote;
