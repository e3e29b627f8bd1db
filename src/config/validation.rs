use crate::config::types::{
    Config, ExtractionConfig, LifecycleConfig, OutputConfig, RenderConfig, SelectorConfig,
    SourceConfig, UserAgentConfig, MAX_INACTIVITY_HOURS, MAX_RETENTION_DAYS,
};
use crate::text::normalize_state;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_render_config(&config.render)?;
    validate_lifecycle_config(&config.lifecycle)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    // The name doubles as the robots.txt agent token
    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if let Some(service_url) = &config.service_url {
        validate_http_url(service_url, "render service-url")?;
    }
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "render timeout-secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// The retention window counts from the moment a posting goes stale, but a
/// retention shorter than the inactivity window is almost always a typo
fn validate_lifecycle_config(config: &LifecycleConfig) -> Result<(), ConfigError> {
    if config.inactivity_hours == 0 {
        return Err(ConfigError::Validation(
            "inactivity-hours must be >= 1".to_string(),
        ));
    }

    if config.inactivity_hours > MAX_INACTIVITY_HOURS {
        return Err(ConfigError::Validation(format!(
            "inactivity-hours must be <= {}, got {}",
            MAX_INACTIVITY_HOURS, config.inactivity_hours
        )));
    }

    if config.retention_days > MAX_RETENTION_DAYS {
        return Err(ConfigError::Validation(format!(
            "retention-days must be <= {}, got {}",
            MAX_RETENTION_DAYS, config.retention_days
        )));
    }

    if config.retention_window()? <= config.inactivity_window()? {
        return Err(ConfigError::Validation(format!(
            "retention-days ({} days) must be longer than inactivity-hours ({} hours)",
            config.retention_days, config.inactivity_hours
        )));
    }

    Ok(())
}

/// Validates every source and checks that names are unique
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        validate_source(source)?;

        if !seen.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source name '{}'",
                source.name
            )));
        }
    }

    Ok(())
}

fn validate_source(source: &SourceConfig) -> Result<(), ConfigError> {
    if source.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "Source name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&source.base_url, &format!("base-url of '{}'", source.name))?;
    if let Some(listing) = &source.listing_url {
        validate_http_url(listing, &format!("listing-url of '{}'", source.name))?;
    }

    if let Some(state) = &source.default_state {
        if normalize_state(state).is_none() {
            return Err(ConfigError::Validation(format!(
                "Source '{}' has unknown default-state '{}'",
                source.name, state
            )));
        }
    }

    for selector in source
        .render_hints
        .wait_for
        .iter()
        .chain(source.render_hints.click_selector.iter())
        .chain(source.render_hints.click_wait_for.iter())
        .chain(source.render_hints.select_actions.iter().map(|a| &a.selector))
    {
        validate_selector(selector, &source.name)?;
    }

    match &source.extraction {
        ExtractionConfig::Selectors(selectors) => validate_selectors(selectors, &source.name),
        ExtractionConfig::Custom { name, .. } => {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Source '{}' names an empty custom strategy",
                    source.name
                )));
            }
            Ok(())
        }
    }
}

fn validate_selectors(config: &SelectorConfig, source_name: &str) -> Result<(), ConfigError> {
    for (field, value) in [
        ("container", &config.container),
        ("title", &config.title),
        ("link", &config.link),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Source '{}' is missing the required '{}' selector",
                source_name, field
            )));
        }
        validate_selector(value, source_name)?;
    }

    for value in [
        &config.organization,
        &config.location,
        &config.job_type,
        &config.salary,
        &config.description,
        &config.next_page,
    ]
    .into_iter()
    .flatten()
    {
        validate_selector(value, source_name)?;
    }

    if config.link_attribute.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "Source '{}' has an empty link-attribute",
            source_name
        )));
    }

    if config.max_pages == 0 {
        return Err(ConfigError::Validation(format!(
            "Source '{}' must allow at least one page (max-pages >= 1)",
            source_name
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str, source_name: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!(
            "'{}' in source '{}': {:?}",
            selector, source_name, e
        ))
    })?;
    Ok(())
}

fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
