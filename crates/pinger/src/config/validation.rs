//! Semantic validation of a site configuration.
//!
//! Serde only checks shapes. This pass checks values and cross references and
//! reports every problem at once, so a broken config file is fixed in one go.

use std::collections::HashSet;

use crate::check::CheckStrategy;
use crate::config::SiteConfig;
use crate::error::ConfigurationError;

/// Validate a site configuration, collecting every problem found.
pub fn validate_site(config: &SiteConfig) -> Result<(), ConfigurationError> {
    let mut errors = Vec::new();

    if config.site.trim().is_empty() {
        errors.push(ConfigurationError::EmptySite);
    }

    if config.timeout_secs == 0 {
        errors.push(ConfigurationError::ZeroTimeout);
    }

    let mut seen = HashSet::new();
    for definition in &config.targets {
        // Targets are keyed by their trimmed name.
        let name = definition.name.trim();
        if name.is_empty() {
            errors.push(ConfigurationError::EmptyTargetName);
        } else if !seen.insert(name) {
            errors.push(ConfigurationError::DuplicateTarget(name.to_string()));
        }

        if let Err(e) = CheckStrategy::from_definition(definition, &config.mac_placeholder) {
            errors.push(e);
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ConfigurationError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetDefinition;

    fn tcp(name: &str) -> TargetDefinition {
        TargetDefinition {
            name: name.into(),
            kind: "tcp".into(),
            ip: Some("127.0.0.1".into()),
            port: Some(22),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = SiteConfig { targets: vec![tcp("ssh"), tcp("ssh-2")], ..Default::default() };
        assert!(validate_site(&config).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = SiteConfig { targets: vec![tcp("ssh"), tcp("ssh")], ..Default::default() };
        assert_eq!(
            validate_site(&config),
            Err(ConfigurationError::DuplicateTarget("ssh".into()))
        );
    }

    #[test]
    fn test_names_differing_only_by_whitespace_rejected() {
        let config = SiteConfig { targets: vec![tcp("lan"), tcp(" lan ")], ..Default::default() };
        assert_eq!(
            validate_site(&config),
            Err(ConfigurationError::DuplicateTarget("lan".into()))
        );
    }

    #[test]
    fn test_all_problems_reported() {
        let mut broken = tcp("ftp");
        broken.kind = "gopher".into();
        let config = SiteConfig {
            timeout_secs: 0,
            targets: vec![broken, tcp("")],
            ..Default::default()
        };

        match validate_site(&config) {
            Err(ConfigurationError::Multiple(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.contains(&ConfigurationError::ZeroTimeout));
                assert!(errors.contains(&ConfigurationError::EmptyTargetName));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
