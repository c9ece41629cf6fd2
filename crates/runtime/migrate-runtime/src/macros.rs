//! Call-site helpers.

/// Opportunistic migration check at the current call site.
///
/// Rust exposes no stable return-address intrinsic, so the macro
/// materializes a stable code address (a local fn item) and hands it to
/// the detector as the candidate program counter.
///
/// The materialized item is a distinct symbol, and the linker does not
/// necessarily place it inside the calling function's own `[start, end)`.
/// Configured address ranges must cover the materialized point, not the
/// caller's body; a range drawn tightly around the caller may never fire.
/// When the candidate must be an exact, known address, call
/// `check_migrate_at` with that address directly.
///
/// ```rust,ignore
/// fn hot_loop(runtime: &MigrationRuntime) {
///     loop {
///         check_migrate!(runtime).unwrap();
///         // ...
///     }
/// }
/// ```
#[macro_export]
macro_rules! check_migrate {
    ($runtime:expr) => {{
        fn __migration_point() {}
        $runtime.check_migrate_at(__migration_point as usize as u64, None)
    }};
    ($runtime:expr, $callback:expr) => {{
        fn __migration_point() {}
        $runtime.check_migrate_at(__migration_point as usize as u64, Some($callback))
    }};
}
