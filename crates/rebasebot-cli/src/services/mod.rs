//! Service layer: the run pipeline and its forge-facing pieces.
//!
//! Services take their git and GitHub dependencies as trait parameters so
//! tests can drive them against temporary repositories and in-memory mocks.

pub mod controller;
pub mod credentials;
pub mod notify;
pub mod pull_request;

#[cfg(test)]
pub mod test_mocks;

pub use controller::{LocalWorkspace, RunController, RunOptions, classify};
pub use credentials::{GitHubAuth, RunCredentials};
pub use notify::SlackNotifier;
