use crate::core::config::SessionConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashMap;
use tracing::info;

/// Session state shared across workers: cookies and auth headers that
/// every request carries, for crawls behind a login or API gateway.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl SessionManager {
    pub fn from_config(config: &SessionConfig) -> Self {
        let mut headers = config.headers.clone();

        if let Some((username, password)) = &config.basic_auth {
            let credentials = STANDARD.encode(format!("{username}:{password}"));
            headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
        }
        // A bearer token takes precedence when both are configured.
        if let Some(token) = &config.bearer_token {
            if !token.is_empty() {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }

        if !config.cookies.is_empty() || !headers.is_empty() {
            info!(
                cookies = config.cookies.len(),
                headers = headers.len(),
                "session configured"
            );
        }

        Self {
            cookies: config.cookies.clone(),
            headers,
        }
    }

    pub fn cookies(&self) -> Option<&HashMap<String, String>> {
        if self.cookies.is_empty() {
            None
        } else {
            Some(&self.cookies)
        }
    }

    pub fn headers(&self) -> Option<&HashMap<String, String>> {
        if self.headers.is_empty() {
            None
        } else {
            Some(&self.headers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_becomes_header() {
        let config = SessionConfig {
            bearer_token: Some("sekrit".to_string()),
            ..Default::default()
        };
        let session = SessionManager::from_config(&config);
        assert_eq!(
            session.headers().unwrap().get("Authorization").unwrap(),
            "Bearer sekrit"
        );
    }

    #[test]
    fn test_basic_auth_becomes_header() {
        let config = SessionConfig {
            basic_auth: Some(("aladdin".to_string(), "opensesame".to_string())),
            ..Default::default()
        };
        let session = SessionManager::from_config(&config);
        assert_eq!(
            session.headers().unwrap().get("Authorization").unwrap(),
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
    }

    #[test]
    fn test_bearer_wins_over_basic() {
        let config = SessionConfig {
            basic_auth: Some(("user".to_string(), "pass".to_string())),
            bearer_token: Some("tok".to_string()),
            ..Default::default()
        };
        let session = SessionManager::from_config(&config);
        assert_eq!(
            session.headers().unwrap().get("Authorization").unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_empty_session_yields_none() {
        let session = SessionManager::from_config(&SessionConfig::default());
        assert!(session.cookies().is_none());
        assert!(session.headers().is_none());
    }

    #[test]
    fn test_cookies_pass_through() {
        let mut config = SessionConfig::default();
        config
            .cookies
            .insert("sid".to_string(), "abc123".to_string());
        let session = SessionManager::from_config(&config);
        assert_eq!(session.cookies().unwrap().get("sid").unwrap(), "abc123");
    }
}
