use std::sync::LazyLock;

/// Package version, suffixed with the commit hash when the build sets
/// `BAMIDX_GIT_HASH`.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("BAMIDX_GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{version}-{hash}"),
        _ => version.to_string(),
    }
});
