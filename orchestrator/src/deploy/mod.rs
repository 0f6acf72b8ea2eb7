//! Deployment module

pub mod host;
pub mod services;
pub mod stacks;
pub mod templates;

pub use stacks::{DeployerOptions, RenderedStack, StackDeployer};
