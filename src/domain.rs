pub mod audit;
pub mod error;
pub mod gateway;
pub mod history;
pub mod id;
pub mod money;
pub mod notifier;
pub mod payment;
pub mod store;
pub mod workflow;

use std::{future::Future, pin::Pin};

/// Boxed, sendable future returned by the object-safe ports in this module.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
