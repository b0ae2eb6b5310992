use crate::config::{Config, Environment};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON lines in production, pretty output locally. `RUST_LOG` wins over the
/// configured level. Everything goes to stderr so stdout stays free for
/// reports.
pub fn setup_logging(config: &Config) {
    let log_level = format!("{},ureq=warn", config.log_level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.environment {
        Environment::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        Environment::Local => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}
