use crate::environment::Environment;

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Initialize logger with custom format and verbosity.
pub fn initialize_logger(environment: &Environment) {
    LOGGER.get_or_init(|| {
        use tracing_subscriber::{fmt::format::Format, FmtSubscriber};

        let subscriber = FmtSubscriber::builder()
            .with_max_level(environment.verbosity())
            .with_target(false)
            .event_format(Format::default())
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}
