//! Configuration loader - merges env vars, .env file, and config.toml.

use common::config::AppConfig;
use common::Error;
use std::path::Path;

fn parse_positive_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number > 0")))?;
    if parsed <= 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number > 0")));
    }
    Ok(parsed)
}

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.api_base_url.trim().is_empty() {
        issues.push("api_base_url must not be empty".into());
    }

    if config.display.items_per_page == 0 {
        issues.push("display.items_per_page must be > 0".into());
    }
    if config.display.page_size_choices.is_empty() {
        issues.push("display.page_size_choices must not be empty".into());
    } else if !config
        .display
        .page_size_choices
        .contains(&config.display.items_per_page)
    {
        issues.push("display.items_per_page must be one of display.page_size_choices".into());
    }
    if !matches!(
        config.display.default_sort.as_str(),
        "price_delta" | "current_price"
    ) {
        issues.push("display.default_sort must be price_delta or current_price".into());
    }
    if config.display.min_price_change_threshold < 0.0 {
        issues.push("display.min_price_change_threshold must be >= 0".into());
    }
    if config.display.fair_band_pct < 0.0 || config.display.fair_band_pct > 1.0 {
        issues.push("display.fair_band_pct must be in [0,1]".into());
    }
    if config.display.flagged_threshold_pct < 0.0 || config.display.flagged_threshold_pct > 1.0 {
        issues.push("display.flagged_threshold_pct must be in [0,1]".into());
    }

    if config.apply.nudge_increment <= 0.0 {
        issues.push("apply.nudge_increment must be > 0".into());
    }

    if config.polling.max_attempts == 0 {
        issues.push("polling.max_attempts must be > 0".into());
    }
    if config.polling.initial_backoff_secs == 0 {
        issues.push("polling.initial_backoff_secs must be > 0".into());
    }
    if config.polling.max_backoff_secs < config.polling.initial_backoff_secs {
        issues.push("polling.max_backoff_secs must be >= polling.initial_backoff_secs".into());
    }
    if config.polling.request_timeout_secs == 0 {
        issues.push("polling.request_timeout_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load client configuration from environment and optional config file.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    if let Ok(url) = std::env::var("WAXVALUE_API_BASE_URL") {
        config.api_base_url = url;
    }
    if let Ok(session) = std::env::var("WAXVALUE_SESSION_ID") {
        config.session_id = session;
    }
    if let Ok(dir) = std::env::var("WAXVALUE_STATE_DIR") {
        config.state_dir = dir;
    }
    if let Ok(raw) = std::env::var("WAXVALUE_COMMIT_DELAY_MS") {
        // 0 is allowed: commit immediately.
        config.apply.commit_delay_ms = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Config("WAXVALUE_COMMIT_DELAY_MS must be an integer >= 0".into()))?;
    }
    if let Ok(raw) = std::env::var("WAXVALUE_NUDGE_INCREMENT") {
        config.apply.nudge_increment = parse_positive_f64(&raw, "WAXVALUE_NUDGE_INCREMENT")?;
    }
    if let Ok(raw) = std::env::var("WAXVALUE_MIN_PRICE_CHANGE") {
        // 0 is allowed: every row counts as actionable.
        config.display.min_price_change_threshold =
            parse_non_negative_f64(&raw, "WAXVALUE_MIN_PRICE_CHANGE")?;
    }
    if let Ok(raw) = std::env::var("WAXVALUE_POLL_MAX_ATTEMPTS") {
        config.polling.max_attempts =
            parse_positive_u64(&raw, "WAXVALUE_POLL_MAX_ATTEMPTS")? as u32;
    }

    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_page_size_must_be_a_choice() {
        let mut config = AppConfig::default();
        config.display.items_per_page = 33;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("page_size_choices"));
    }

    #[test]
    fn test_backoff_ceiling_must_cover_initial() {
        let mut config = AppConfig::default();
        config.polling.initial_backoff_secs = 120;
        config.polling.max_backoff_secs = 60;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unknown_sort_key_rejected() {
        let mut config = AppConfig::default();
        config.display.default_sort = "artist".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_min_price_change_override_allows_zero() {
        assert_eq!(parse_non_negative_f64("0", "X").unwrap(), 0.0);
        assert_eq!(parse_non_negative_f64(" 1.5 ", "X").unwrap(), 1.5);
        assert!(parse_non_negative_f64("-0.5", "X").is_err());
        assert!(parse_non_negative_f64("abc", "X").is_err());
    }

    #[test]
    fn test_fair_band_outside_unit_interval_rejected() {
        let mut config = AppConfig::default();
        config.display.fair_band_pct = 1.5;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fair_band_pct"));
    }
}
