pub mod gallery;

pub use gallery::TestGallery;

use std::str::FromStr;

use tracing::Level;

/// Install a test-writer subscriber once per test binary. `LOG_LEVEL`
/// overrides the default INFO level.
pub fn init_tracing() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| Level::from_str(&level).ok())
        .unwrap_or(Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}
