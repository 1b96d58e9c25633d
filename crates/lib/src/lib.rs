//! droidforge-lib: cross-compilation build orchestration for Android sysroots
//!
//! This crate drives a fixed set of native libraries through the
//! fetch → verify → extract → patch → build stages and installs their static
//! artifacts into a per-architecture sysroot:
//! - `platform`: target architecture profiles and host detection
//! - `toolchain`: NDK location and the derived cross-compilation environment
//! - `source`: downloading, verifying, unpacking and patching source trees
//! - `package`: the package registry and per-package build recipes
//! - `sysroot`: the shared install root and its install bookkeeping
//! - `pipeline`: the sequencer that runs packages in declared order

pub mod config;
pub mod consts;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod runner;
pub mod source;
pub mod sysroot;
pub mod toolchain;
pub mod util;
