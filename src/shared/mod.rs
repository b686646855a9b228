pub mod errors;
pub mod shutdown;

pub use errors::{AppError, DomainError, InfraError, StoreResult};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
