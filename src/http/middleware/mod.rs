//! Tower middleware for services that make downstream calls.

pub mod propagation;

pub use propagation::{PropagationLayer, PropagationService};
