//! Integration tests for swarmdeck

mod support;

mod test_orchestrator;
mod test_probe;
mod test_server;
