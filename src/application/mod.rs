// Application layer - use cases and orchestration.
// The service owns the repository, the policy and the activity sink; the CLI
// and any other client talk only to the service.

pub mod error;
pub mod locks;
pub mod reporting;
pub mod service;

pub use error::*;
pub use locks::*;
pub use reporting::*;
pub use service::*;
