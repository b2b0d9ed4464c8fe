pub mod gateway;
pub mod notifier;
pub mod signature;
