/// casement build script.
///
/// Validates that the target OS has a native backend. The `headless` feature
/// links the in-memory display server instead, so any target is accepted.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Cargo exposes enabled features to build scripts as CARGO_FEATURE_<NAME>.
    if std::env::var_os("CARGO_FEATURE_HEADLESS").is_some() {
        return;
    }

    // Hard gate: fail loudly on a target without a backend rather than
    // silently producing a library whose `create` can never succeed.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if !matches!(target_os.as_str(), "windows" | "linux" | "macos") {
        panic!(
            "casement has no native backend for this target \
             (CARGO_CFG_TARGET_OS = {target_os:?}); enable the `headless` feature"
        );
    }
}
