pub mod error;
pub mod executor;
pub mod logging;
pub mod remote;
pub mod reporter;

pub use error::{DbdError, Result};
pub use executor::ConcurrentExecutor;
pub use remote::{CommandResult, RemoteClient, Server};
pub use reporter::Reporter;
