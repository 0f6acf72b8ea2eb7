//! swarmdeck library
//!
//! Provisions a remote host into a single-node Docker Swarm and deploys a
//! fixed catalog of service stacks onto it.

pub mod app;
pub mod catalog;
pub mod deploy;
pub mod dns;
pub mod errors;
pub mod filesys;
pub mod jobs;
pub mod logs;
pub mod orchestrator;
pub mod probe;
pub mod remote;
pub mod resolver;
pub mod server;
pub mod storage;
pub mod utils;
