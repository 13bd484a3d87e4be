//! Logging setup and startup summary

use crate::config::{BridgeConfig, LoggingConfig};
use crate::error::{BridgeError, Result};
use tracing::{debug, info, warn};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so stdout stays free for protocol traffic. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    config.validate()?;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.level.to_lowercase())
            .map_err(|e| BridgeError::config(format!("Invalid log level '{}': {}", config.level, e)))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    match installed {
        Ok(()) => {
            debug!(level = %config.level, format = %config.format, "Logging initialized");
            Ok(true)
        }
        Err(e) => {
            debug!("Global subscriber already set: {}", e);
            Ok(false)
        }
    }
}

/// Startup logger for configuration summaries
pub struct StartupLogger;

impl StartupLogger {
    /// Log what the bridge is about to serve
    pub fn display_startup_info(config: &BridgeConfig, tool_count: usize) {
        info!("🚀 {} v{} starting...", config.server.name, config.server.version);

        info!("📁 Registry sources:");
        if config.registry.sources.is_empty() {
            info!("   none (modules registered programmatically)");
        }
        for source in &config.registry.sources {
            info!("   {}", source);
        }

        info!("🎯 Tool surface:");
        info!("   Naming: {:?}", config.tools.naming);
        if !config.tools.tags.is_empty() {
            info!("   Required tags: {}", config.tools.tags.join(", "));
        }
        if let Some(prefix) = &config.tools.prefix {
            info!("   Id prefix: {}", prefix);
        }
        info!(
            "   Input validation: {}",
            if config.execution.validate_inputs { "enabled" } else { "disabled" }
        );

        info!("📤 Function-calling export:");
        info!(
            "   strict={} embed_annotations={} cyclic_policy={:?}",
            config.export.strict, config.export.embed_annotations, config.export.cyclic_policy
        );

        if tool_count > 0 {
            info!("✅ Tool registry ({} tools loaded)", tool_count);
        } else {
            warn!("⚠️  Tool registry (no tools loaded)");
        }
    }
}
