//! Analysis core: artifact storage, audit logging, engine invocation,
//! output parsing and the orchestrating state machine.

pub mod engine;
pub mod orchestrator;
pub mod parser;
pub mod runlog;
pub mod store;
pub mod types;
