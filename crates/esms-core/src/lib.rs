#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::default_trait_access)]

pub mod config;
pub mod error;
pub mod plugin;
pub mod resolver;
pub mod serve;
pub mod transform;

pub use config::{find_config_file, load_config, ConfigFile, EsmsOptions};
pub use error::{Error, TransformError};
pub use plugin::{PatternPlugin, Plugin};
pub use resolver::{resolve, Resolution, ResolveReasonCode};
pub use serve::{ModuleRequest, ModuleServer, ServeOutcome, ServedModule};
pub use transform::{transform, TransformOutput};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
