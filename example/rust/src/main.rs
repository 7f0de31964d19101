use std::{thread::sleep, time::Duration};

use flagkit::{flags, init};

/// An example usage of the Rust flags client library
/// Every 3 seconds, refreshes and prints the state of every flag
///
/// Editing `flagkit/remote/Features.json` (or the directory in `FLAGKIT_DIR`)
/// will be reflected in stdout, while each test keeps its assigned variation
/// ^C to exit
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .init();

    init()?;
    let store = flags().ok_or_else(|| anyhow::anyhow!("flags not initialized"))?;

    loop {
        match store.refresh() {
            Some(source) => tracing::info!(?source, "refreshed"),
            None => tracing::warn!("no flag configuration found"),
        }
        for flag in store.sorted() {
            let variation = store
                .test_variation(flag.name())
                .map(|v| v.to_string())
                .unwrap_or_default();
            println!(
                "{}: enabled={} variation={} label={}",
                flag.name(),
                store.is_enabled(flag.name()),
                variation,
                store.current_label(flag.name()).unwrap_or_default()
            );
        }
        sleep(Duration::from_secs(3));
    }
}
