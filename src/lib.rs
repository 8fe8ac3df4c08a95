// Public API for integration tests and potential library usage

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod presence;
pub mod protocol;
pub mod scoring;
pub mod seed;
pub mod state;
pub mod store;
pub mod turn;
pub mod types;
pub mod ws;
