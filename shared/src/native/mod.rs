//! Native shell support: environment config, the Gemini client and a headless effect loop.

pub mod config;
pub mod gemini;
pub mod logging;
pub mod shell;

use tracing::warn;

pub use self::config::{ConfigError, InferenceConfig};
pub use self::gemini::GeminiClient;
pub use self::logging::init_logging;
pub use self::shell::{CameraDevice, InferenceBackend, Shell};

/// Builds the Gemini client from the environment. `None` leaves inference unconfigured,
/// which surfaces to the user as a configuration error on submit.
pub fn gemini_from_env() -> Option<GeminiClient> {
    let config = match InferenceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "inference is not configured");
            return None;
        }
    };

    match GeminiClient::new(config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "failed to build inference client");
            None
        }
    }
}
