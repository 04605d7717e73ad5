//! Mail-provider OAuth credential loading.
//!
//! Nothing in the evaluation path calls this; it is kept so a live
//! mail-backed assistant can be wired up without re-deriving the lookup
//! order. Sources are tried in order, and a source that is present but
//! unparsable falls through to the next one:
//!
//! 1. an explicit JSON token string
//! 2. the `GMAIL_TOKEN` environment variable
//! 3. the `.secrets/token.json` file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const GMAIL_TOKEN_ENV: &str = "GMAIL_TOKEN";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailCredentials {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![GMAIL_MODIFY_SCOPE.to_string()]
}

/// Where a credential set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Parameter,
    Environment,
    File(PathBuf),
}

pub fn default_token_path() -> PathBuf {
    Path::new(".secrets").join("token.json")
}

/// Load credentials from the parameter, the environment, then the default file.
pub fn load_gmail_credentials(token: Option<&str>) -> Option<GmailCredentials> {
    let env_value = std::env::var(GMAIL_TOKEN_ENV).ok();
    load_gmail_credentials_from(token, env_value.as_deref(), &default_token_path())
        .map(|(creds, _)| creds)
}

/// Source-explicit variant of [`load_gmail_credentials`].
pub fn load_gmail_credentials_from(
    token: Option<&str>,
    env_value: Option<&str>,
    token_path: &Path,
) -> Option<(GmailCredentials, CredentialSource)> {
    if let Some(creds) = token.and_then(|raw| parse("gmail_token parameter", raw)) {
        debug!("using gmail_token parameter");
        return Some((creds, CredentialSource::Parameter));
    }

    if let Some(creds) = env_value.and_then(|raw| parse(GMAIL_TOKEN_ENV, raw)) {
        debug!("using {GMAIL_TOKEN_ENV} environment variable");
        return Some((creds, CredentialSource::Environment));
    }

    if token_path.exists() {
        match std::fs::read_to_string(token_path) {
            Ok(raw) => {
                if let Some(creds) = parse(&token_path.display().to_string(), &raw) {
                    debug!(path = %token_path.display(), "using token file");
                    return Some((creds, CredentialSource::File(token_path.to_path_buf())));
                }
            }
            Err(e) => warn!(path = %token_path.display(), error = %e, "could not read token file"),
        }
    }

    debug!("no gmail credentials found");
    None
}

fn parse(source: &str, raw: &str) -> Option<GmailCredentials> {
    match serde_json::from_str(raw) {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!(source = %source, error = %e, "could not parse gmail token");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = r#"{"token": "ya29.a", "refresh_token": "1//r", "client_id": "cid"}"#;

    #[test]
    fn test_parameter_wins() {
        let (creds, source) = load_gmail_credentials_from(
            Some(TOKEN),
            Some(r#"{"token": "from-env"}"#),
            Path::new("/nonexistent/token.json"),
        )
        .unwrap();
        assert_eq!(source, CredentialSource::Parameter);
        assert_eq!(creds.token.as_deref(), Some("ya29.a"));
        assert_eq!(creds.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(creds.scopes, vec![GMAIL_MODIFY_SCOPE.to_string()]);
    }

    #[test]
    fn test_bad_parameter_falls_through_to_env() {
        let (creds, source) = load_gmail_credentials_from(
            Some("not json"),
            Some(r#"{"token": "from-env", "scopes": ["s"]}"#),
            Path::new("/nonexistent/token.json"),
        )
        .unwrap();
        assert_eq!(source, CredentialSource::Environment);
        assert_eq!(creds.token.as_deref(), Some("from-env"));
        assert_eq!(creds.scopes, vec!["s".to_string()]);
    }

    #[test]
    fn test_file_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, TOKEN).unwrap();

        let (creds, source) = load_gmail_credentials_from(None, None, &path).unwrap();
        assert_eq!(source, CredentialSource::File(path.clone()));
        assert_eq!(creds.client_id.as_deref(), Some("cid"));
    }

    #[test]
    fn test_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(load_gmail_credentials_from(None, Some("also broken"), &path).is_none());
    }
}
