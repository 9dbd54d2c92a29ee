use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Console diagnostics. `RUST_LOG` wins over the `--debug` default.
pub fn init(debug: bool) {
    let default_filter = if debug {
        "housegallery=debug,gallery_probe=debug"
    } else {
        "housegallery=info,gallery_probe=info"
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
