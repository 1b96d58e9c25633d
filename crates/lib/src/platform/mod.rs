//! Target architectures and host platform detection.

pub mod arch;
pub mod os;
pub mod paths;

pub use arch::{ArchProfile, TargetArch};
pub use os::Os;
