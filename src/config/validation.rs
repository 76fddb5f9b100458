//! Configuration validation functions.

use super::Config;

/// Reject configurations the relay cannot run with.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    config.bind_addr()?;

    if config.server.outbound_queue_capacity == 0 {
        anyhow::bail!("server.outbound_queue_capacity must be at least 1");
    }

    if config.server.max_line_length == 0 {
        anyhow::bail!("server.max_line_length must be at least 1");
    }

    if config.server.history_limit == Some(0) {
        anyhow::bail!(
            "server.history_limit must be at least 1 (use null to keep the full history)"
        );
    }

    if config.logging.enable_file_logging && config.logging.filename.trim().is_empty() {
        anyhow::bail!("logging.filename must not be empty when file logging is enabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_queue_capacity() {
        let mut config = Config::default();
        config.server.outbound_queue_capacity = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("outbound_queue_capacity"));
    }

    #[test]
    fn test_rejects_zero_max_line_length() {
        let mut config = Config::default();
        config.server.max_line_length = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_line_length"));
    }

    #[test]
    fn test_rejects_zero_history_limit() {
        let mut config = Config::default();
        config.server.history_limit = Some(0);
        assert!(validate_config(&config).is_err());

        config.server.history_limit = Some(1);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_unparseable_host() {
        let config = Config {
            host: "not-an-ip".to_string(),
            ..Config::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid host"));
    }

    #[test]
    fn test_rejects_empty_log_filename_with_file_logging() {
        let mut config = Config::default();
        config.logging.enable_file_logging = true;
        config.logging.filename = "  ".to_string();
        assert!(validate_config(&config).is_err());

        config.logging.enable_file_logging = false;
        assert!(validate_config(&config).is_ok());
    }
}
