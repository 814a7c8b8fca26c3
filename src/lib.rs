pub mod cache;
pub mod comparator;
pub mod config;
pub mod economy;
pub mod engine;
pub mod error;
pub mod monte_carlo;
pub mod prediction;
pub mod reconstruct;
pub mod report_export;
pub mod retake;
pub mod round_model;
pub mod scenario_store;
pub mod scenarios;
pub mod state;
pub mod validator;
