/// Application name used for cache and data directories.
pub const APP_NAME: &str = "droidforge";

/// Lowest Android API level a build may target.
pub const MIN_API_LEVEL: u32 = 21;

/// Highest Android API level a build may target.
pub const MAX_API_LEVEL: u32 = 29;

/// Environment variable naming the NDK installation root.
pub const NDK_ENV_VAR: &str = "ANDROID_NDK";

/// Environment variable overriding the build output root.
pub const OUT_ENV_VAR: &str = "DROIDFORGE_OUT";

/// Environment variable overriding the download cache.
pub const CACHE_ENV_VAR: &str = "DROIDFORGE_CACHE";

/// Install prefix used by every package inside the sysroot.
pub const INSTALL_PREFIX: &str = "/usr";

/// Marker written into an extracted source tree once it is materialized.
pub const SOURCE_MARKER: &str = ".droidforge-source.json";

/// Directory inside the sysroot holding install bookkeeping.
pub const SYSROOT_META_DIR: &str = ".droidforge";

/// Host variables passed through to every subprocess.
pub const HOST_PASSTHROUGH: &[&str] = &["PATH", "HOME", "TMPDIR", "LANG", "TERM"];

/// Binutils exported as uppercase variables (`AR`, `AS`, ...).
pub const BINUTILS: &[&str] = &["ar", "as", "ld", "objcopy", "objdump", "ranlib", "strip", "readelf"];
