mod build;
mod info;
mod toolchain;

pub use build::{BuildArgs, cmd_build};
pub use info::cmd_info;
pub use toolchain::cmd_toolchain_install;
