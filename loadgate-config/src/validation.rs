//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate an HTTP(S) URL
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} scheme '{}' is not supported (only http/https)",
                field_name, scheme
            ),
        }),
    }
}

/// Validate that a path is absolute with respect to the base URL
pub fn validate_url_path(path: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must start with '/', got '{}'", field_name, path),
        });
    }
    Ok(())
}

/// Validate that `min <= max` for an inclusive range
pub fn validate_inclusive_range<T>(
    min: T,
    max: T,
    field_name: &str,
    domain: &str,
) -> ConfigResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if min > max {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} range is empty: min {} is greater than max {}",
                field_name, min, max
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_string() {
        assert!(validate_required_string("value", "field", "test").is_ok());
        assert!(validate_required_string("", "field", "test").is_err());
        assert!(validate_required_string("   ", "field", "test").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u64, "field", "test").is_ok());
        assert!(validate_positive(0u64, "field", "test").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://localhost:8080", "url", "test").is_ok());
        assert!(validate_url("https://example.com/api", "url", "test").is_ok());
        assert!(validate_url("not-a-url", "url", "test").is_err());
        assert!(validate_url("ftp://example.com", "url", "test").is_err());
        assert!(validate_url("", "url", "test").is_err());
    }

    #[test]
    fn test_unparsable_url_is_a_domain_error() {
        match validate_url("http://[::1", "base_url", "target") {
            Err(ConfigError::DomainError { domain, message }) => {
                assert_eq!(domain, "target");
                assert!(message.starts_with("base_url has invalid URL format"));
            }
            other => panic!("expected a target domain error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_url_path() {
        assert!(validate_url_path("/api/v1/evaluate", "path", "test").is_ok());
        assert!(validate_url_path("api/v1/evaluate", "path", "test").is_err());
    }

    #[test]
    fn test_validate_inclusive_range() {
        assert!(validate_inclusive_range(1, 100, "age", "test").is_ok());
        assert!(validate_inclusive_range(5, 5, "age", "test").is_ok());

        let err = validate_inclusive_range(10, 1, "age", "test").unwrap_err();
        assert!(err.to_string().contains("min 10 is greater than max 1"));
    }
}
