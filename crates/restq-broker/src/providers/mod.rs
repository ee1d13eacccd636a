//! Broker provider implementations.

mod memory;

pub use memory::InMemoryBroker;
