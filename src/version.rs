//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit SHA supplied by the build environment via `CLUSTERMETA_GIT_SHA`,
/// or "unknown".
pub const GIT_SHA: &str = match option_env!("CLUSTERMETA_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Version string: `{version}` or `{version}+{sha}` when a SHA was supplied.
///
/// Examples:
/// - `0.2.1`
/// - `0.2.1+abc1234`
pub fn version_string() -> String {
    if GIT_SHA == "unknown" {
        PKG_VERSION.to_string()
    } else {
        format!("{PKG_VERSION}+{}", &GIT_SHA[..7.min(GIT_SHA.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_pkg_version() {
        assert!(version_string().starts_with(PKG_VERSION));
    }

    #[test]
    fn sha_suffix_is_short() {
        let version = version_string();
        match version.split_once('+') {
            Some((_, sha)) => assert!(sha.len() <= 7),
            None => assert_eq!(version, PKG_VERSION),
        }
    }
}
