//! Tracing filter construction
//!
//! Every component logs under its module path (`aerolink::transport`,
//! `aerolink::resilience`, `aerolink::session`, ...), so per-component levels
//! from `[logging.component_levels]` become plain `EnvFilter` directives.

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels, sorted by component name.
///
/// # Examples
///
/// ```
/// use aerolink::config::logging::{LogFormat, LoggingConfig};
/// use aerolink::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("resilience".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,aerolink::resilience=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",aerolink::{}={}", component, level));
        }
    }

    filter_str
}
