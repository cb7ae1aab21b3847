// tests/common/mod.rs

#![allow(dead_code)]

use std::path::Path;

use mom_queue::{Transport, TransportBuilder};

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}

/// A dropfile transport under `base`, bound to `binding`.
pub async fn dropfile_transport(base: &Path, binding: &str) -> Transport {
    // ---
    TransportBuilder::new()
        .broker("dropfile")
        .host(base.to_string_lossy())
        .bind(binding)
        .build()
        .await
        .expect("failed to build dropfile transport")
}

/// Number of message files (pending, in flight, or resolved but not yet
/// deleted) in a binding directory.
pub fn message_files(dir: &Path) -> usize {
    // ---
    std::fs::read_dir(dir)
        .expect("binding directory missing")
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let path = entry.path();
            let visible = !entry.file_name().to_string_lossy().starts_with('.');
            visible && path.extension().is_some_and(|ext| ext == "msg")
        })
        .count()
}
