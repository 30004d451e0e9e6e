//! Interceptor options.

use crate::interceptor::{InterceptorMode, UnhandledDeclaration};
use serde::{Deserialize, Serialize};

fn default_safe_limit() -> usize {
    1000
}

/// Whether handlers keep the requests they answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSavingOptions {
    #[serde(default)]
    pub enabled: bool,
    /// Number of saved requests above which a warning is logged
    #[serde(default = "default_safe_limit")]
    pub safe_limit: usize,
}

impl Default for RequestSavingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            safe_limit: default_safe_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptorOptions {
    pub base_url: String,
    #[serde(default)]
    pub mode: InterceptorMode,
    #[serde(default)]
    pub request_saving: RequestSavingOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_unhandled_request: Option<UnhandledDeclaration>,
}

impl InterceptorOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            mode: InterceptorMode::Local,
            request_saving: RequestSavingOptions::default(),
            on_unhandled_request: None,
        }
    }

    pub fn mode(mut self, mode: InterceptorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn save_requests(mut self, enabled: bool) -> Self {
        self.request_saving.enabled = enabled;
        self
    }

    pub fn safe_limit(mut self, safe_limit: usize) -> Self {
        self.request_saving.safe_limit = safe_limit;
        self
    }

    pub fn on_unhandled_request(mut self, declaration: UnhandledDeclaration) -> Self {
        self.on_unhandled_request = Some(declaration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_yaml;
    use crate::http::ResponseAction;
    use rstest::rstest;

    #[rstest]
    fn test_defaults_when_omitted() {
        let options: InterceptorOptions =
            parse_yaml("baseUrl: http://localhost:3000").expect("valid options");
        assert_eq!(options, InterceptorOptions::new("http://localhost:3000"));
        assert_eq!(options.request_saving.safe_limit, 1000);
        assert!(!options.request_saving.enabled);
    }

    #[rstest]
    fn test_full_options() {
        let options: InterceptorOptions = parse_yaml(
            "baseUrl: http://localhost:3000\n\
             mode: remote\n\
             requestSaving:\n  enabled: true\n  safeLimit: 5\n\
             onUnhandledRequest:\n  action: bypass\n  log: false\n",
        )
        .expect("valid options");

        assert_eq!(options.mode, InterceptorMode::Remote);
        assert_eq!(
            options.request_saving,
            RequestSavingOptions {
                enabled: true,
                safe_limit: 5
            }
        );
        assert_eq!(
            options.on_unhandled_request,
            Some(UnhandledDeclaration {
                action: ResponseAction::Bypass,
                log: Some(false)
            })
        );
    }
}
