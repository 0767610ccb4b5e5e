//! Input validation for identifiers that end up inside query URLs
//!
//! Anything an operator types that is interpolated into an OData filter or a
//! URL path goes through here first, so a typo fails fast with a clear message
//! instead of a 400 from the service.

use uuid::Uuid;

/// Validates domain names such as `contoso.onmicrosoft.com`
pub struct DomainValidator;

impl DomainValidator {
    pub fn new() -> Self {
        Self {}
    }

    /// Checks a domain name against RFC 1035 shape rules
    ///
    /// - total length 1..=253
    /// - at least two labels, TLD of 2+ characters
    /// - labels of 1..=63 ASCII alphanumerics or hyphens
    /// - labels neither start nor end with a hyphen
    pub fn validate_domain_format(&self, domain: &str) -> bool {
        if domain.is_empty() || domain.len() > 253 {
            return false;
        }

        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 {
            return false;
        }

        match labels.last() {
            Some(tld) if tld.len() >= 2 => {}
            _ => return false,
        }

        labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
    }
}

impl Default for DomainValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a domain name and returns an error message if invalid
pub fn validate_domain(domain: &str) -> Result<(), String> {
    if !DomainValidator::new().validate_domain_format(domain) {
        return Err(format!("Invalid domain format: {}", domain));
    }
    Ok(())
}

/// Validates a directory object id (users, service principals, role definitions)
pub fn validate_object_id(id: &str) -> Result<(), String> {
    Uuid::parse_str(id.trim())
        .map(|_| ())
        .map_err(|_| format!("Invalid object id (expected a GUID): {}", id))
}

/// Validates every id in `ids`, reporting the first bad one
pub fn validate_object_ids(ids: &[String]) -> Result<(), String> {
    ids.iter().try_for_each(|id| validate_object_id(id))
}

/// Validates a user principal name (`user@domain`)
pub fn validate_user_principal_name(upn: &str) -> Result<(), String> {
    match upn.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !local.chars().any(|c| c.is_whitespace() || c.is_control())
                && DomainValidator::new().validate_domain_format(domain) =>
        {
            Ok(())
        }
        _ => Err(format!("Invalid user principal name: {}", upn)),
    }
}
