// Application layer - use cases and orchestration.
// The batch pipeline is pure and works on in-memory records; the service
// wires it to the repository.

pub mod batch;
pub mod error;
pub mod reporting;
pub mod service;

pub use batch::*;
pub use error::*;
pub use reporting::*;
pub use service::*;
