pub mod config;
pub mod crossref;
pub mod error;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod resolver;
pub mod throttle;

#[cfg(test)]
mod testing;
