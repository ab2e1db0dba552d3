pub mod analyzer;
pub mod collector;
pub mod config;
pub mod error;
pub mod net;
pub mod netdiag;
pub mod orchestrator;
pub mod parsers;
pub mod rules;
pub mod simulate;
pub mod transport;
pub mod types;
