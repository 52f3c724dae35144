use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Renderer and encoder executables are set
/// - Renderer timeouts are positive
/// - Render defaults form a valid job
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.server.port == 0 {
        return fail("server.port cannot be 0");
    }

    if config.renderer.command.as_os_str().is_empty() {
        return fail("renderer.command cannot be empty");
    }
    if config.renderer.load_timeout_ms == 0
        || config.renderer.readiness_timeout_ms == 0
        || config.renderer.paint_timeout_ms == 0
    {
        return fail("renderer timeouts must be greater than 0");
    }
    if config.renderer.delay_timeout_ms == 0 {
        return fail("renderer.delay_timeout_ms must be greater than 0");
    }
    // Every retry re-arms the delay timer, so the readiness wait must outlast all of them
    let delay_budget = config
        .renderer
        .delay_timeout_ms
        .saturating_mul(u64::from(config.renderer.delay_retries) + 1);
    if config.renderer.readiness_timeout_ms < delay_budget {
        return Err(ConfigError::ValidationError(format!(
            "renderer.readiness_timeout_ms ({}) must cover delay_timeout_ms times (delay_retries + 1) = {}",
            config.renderer.readiness_timeout_ms, delay_budget
        )));
    }

    if config.encoder.ffmpeg_path.as_os_str().is_empty() {
        return fail("encoder.ffmpeg_path cannot be empty");
    }

    let render = &config.render;
    if render.concurrency == 0 {
        return fail("render.concurrency must be at least 1");
    }
    if render.jpeg_quality > 100 {
        return fail("render.jpeg_quality must be within 0..=100");
    }
    if render.width == 0 || render.height == 0 {
        return fail("render.width and render.height must be greater than 0");
    }
    if !render.fps.is_finite() || render.fps <= 0.0 {
        return fail("render.fps must be a positive number");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
                public_url: None,
            },
            ..Config::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_render_defaults() {
        let mut config = Config::default();
        config.render.concurrency = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.render.fps = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.renderer.paint_timeout_ms = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("timeouts"));
    }

    #[test]
    fn test_readiness_timeout_covers_delay_retries() {
        let mut config = Config::default();
        config.renderer.delay_retries = 2;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("readiness_timeout_ms"));

        config.renderer.delay_timeout_ms = 10_000;
        assert!(validate_config(&config).is_ok());

        config.renderer.delay_retries = u32::MAX;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.renderer.delay_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
