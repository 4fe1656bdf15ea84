//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name from Cargo.toml.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Git commit SHA (short) when provided by the build environment, or "unknown".
pub const GIT_SHA: &str = match option_env!("GOWON_MARKOV_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Full version string: `{version}+{sha}`.
///
/// Examples:
/// - `0.2.0+abc1234`
/// - `0.2.0+unknown`
pub fn version_string() -> String {
    format!("{PKG_VERSION}+{}", &GIT_SHA[..7.min(GIT_SHA.len())])
}
