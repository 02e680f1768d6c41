//! AgentFlow core: the CRM store, the closed action set, and the command agent
//! that turns free text into exactly one of those actions.

pub mod action;
pub mod agent;
pub mod config;
pub mod error;
pub mod insights;
pub mod interpreter;
pub mod mail;
pub mod store;
pub mod sweep;
pub mod types;
