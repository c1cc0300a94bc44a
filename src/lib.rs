//! SmartMove: a transit assistant for Toulouse and SNCF rail, built around a
//! planner/tool loop.
//!
//! A language model (the planner) reads the conversation and either answers
//! or asks for lookups; the [`tools::ToolDispatcher`] runs those against the
//! stop database, Google Directions and the SNCF API, and the
//! [`agent::Agent`] feeds the results back until there is an answer.

pub mod agent;
pub mod cli;
pub mod config;
pub mod llm;
pub mod policy;
pub mod server;
pub mod services;
pub mod telemetry;
pub mod tools;
pub mod types;

#[cfg(test)]
mod testing;
