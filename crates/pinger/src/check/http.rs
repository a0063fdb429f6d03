use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Checker, ProbeContext, required, validate_url};
use crate::config::TargetDefinition;
use crate::error::{ConfigurationError, ProbeError};

/// URL checker. Only an exact `200 OK` counts as up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCheck {
    pub url: String,
}

impl HttpCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub(crate) fn from_definition(def: &TargetDefinition) -> Result<Self, ConfigurationError> {
        let url = required(def, &def.url, "url")?;
        validate_url(def, url)?;
        Ok(Self::new(url.clone()))
    }
}

#[async_trait]
impl Checker for HttpCheck {
    async fn check(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        let response = ctx
            .http()
            .get(&self.url)
            .timeout(ctx.timeout())
            .send()
            .await
            .map_err(|e| ProbeError::new(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeError::new(format!(
                "Expected status code 200 but received {}",
                status.as_u16()
            )));
        }

        Ok(format!("status-code: {}", status.as_u16()))
    }

    fn description(&self) -> String {
        self.url.clone()
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("url", self.url.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_http_scheme_rejected() {
        let def = TargetDefinition {
            name: "files".into(),
            kind: "http".into(),
            url: Some("ftp://files.example.net/".into()),
            ..Default::default()
        };
        assert!(matches!(
            HttpCheck::from_definition(&def),
            Err(ConfigurationError::InvalidField { field: "url", .. })
        ));
    }
}
