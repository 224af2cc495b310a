pub mod aggregate;
pub mod defaults;
pub mod executor;
pub mod expand;
pub mod http;
pub mod registry;
pub mod report;
pub mod runner;
pub mod signer;
pub mod template;
pub mod verify;

#[cfg(test)]
mod stub;

pub use aggregate::RunAggregator;
pub use executor::CaseExecutor;
pub use expand::{expand, Step};
pub use registry::{Hook, Registry, Verifier};
pub use runner::Engine;
