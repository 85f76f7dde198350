mod error;
pub use error::{ExecError, ExecResult};

pub mod fetch;
pub use fetch::{FetchError, RuntimeFetcher};
#[cfg(feature = "fetch")]
pub use fetch::MojangFetcher;

pub mod proc;
pub use proc::{ManagerConfig, ProcessManager};

pub mod props;

mod servers;
pub use servers::CreateServer;

pub mod util;
pub use util::LaunchConfig;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{CreateServer, LaunchConfig, ManagerConfig, ProcessManager, RuntimeFetcher};
}
