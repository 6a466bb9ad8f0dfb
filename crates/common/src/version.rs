//! Build version reported by both binaries.

const fn override_or_package_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(version) => version,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// The released version, overridable at build time via `APP_VERSION`.
pub const VERSION: &str = override_or_package_version(option_env!("APP_VERSION"));
