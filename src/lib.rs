pub mod clienv;
pub mod error;
pub mod logging;
pub mod supervisor;
pub mod user_config;

pub use error::{Result, SupervisorError};
pub use supervisor::{
    LifecycleState, Platform, ResolverInputs, RuntimeMode, ServiceConfig, Supervisor,
    SupervisorSettings,
};
