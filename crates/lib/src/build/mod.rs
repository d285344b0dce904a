//! Building modules.
//!
//! `types` holds the request and result types, `compile` runs the Go
//! compiler inside a snapshot, and [`Builder`] orchestrates a whole build.

mod compile;
mod error;
mod execute;
mod types;

pub use compile::compile;
pub use error::{BuildError, ValidationError};
pub use execute::Builder;
pub(crate) use types::is_go_version;
pub use types::{
  BuildLog, BuildMode, BuildOption, BuildSpec, DescriptorFile, Module, ModuleInfo, Source, Target, scn, with_env,
  with_force_delegation, with_log, with_mode,
};
