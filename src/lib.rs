//! Operational diagnostics for long-running services.
//!
//! - [`signals`]: SIGTERM/SIGQUIT relay and the SIGUSR1 stack dump listener
//! - [`stacks`]: stack capture and dump files
//! - [`fswatch`]: all-or-nothing file watchers for config and credential rotation
//! - [`cluster`]: Kubernetes API clients from in-cluster or kubeconfig credentials
pub mod cluster;
pub mod config;
pub mod fswatch;
pub mod signals;
pub mod stacks;
