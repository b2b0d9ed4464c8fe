pub mod activities;
pub mod executor;
pub mod orchestrator;
pub mod reconciler;
pub mod workflow;
