//! goplug-lib: builds Go plugin modules locally or on a remote builder.
//!
//! - [`build::Builder`]: validates a [`build::BuildSpec`], builds it or
//!   forwards it to a [`delegate::Delegation`], and returns a
//!   [`build::Module`]
//! - [`snapshot::Snapshot`]: the per-build workspace and its source rewrites
//! - [`toolchain::Toolchain`]: the Go distribution cache
//! - [`transfer::Transfer`]: packing, unpacking and fetching bytes

pub mod build;
pub mod config;
pub mod consts;
pub mod delegate;
pub mod platform;
pub mod snapshot;
pub mod toolchain;
pub mod transfer;
pub mod util;
