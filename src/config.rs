//! Environment configuration, optionally loaded from a `.env` file.

use url::Url;

use crate::error::ConfigError;
use crate::session::SessionSettings;

pub const DEFAULT_PORT: u16 = 4242;
pub const DEFAULT_IMG_DOMAIN: &str = "https://ostjourney.xyz/";
pub const DEFAULT_LINK: &str = "https://ostjourney.xyz/";
pub const DEFAULT_LARGE_TEXT: &str = "OST Journey";

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: i64,
    pub port: u16,
    pub image_base: Url,
    pub default_link: Url,
    pub large_text: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real env vars still apply.
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let client_id = get("RPC_CLIENT_ID").ok_or(ConfigError::MissingClientId)?;
        let client_id = client_id
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidClientId(client_id))?;

        let port = match get("WEB_SOCKET_PORT") {
            Some(port) => port.parse::<u16>().map_err(|_| ConfigError::InvalidPort(port))?,
            None => DEFAULT_PORT,
        };

        let image_base = get("IMG_DOMAIN").unwrap_or_else(|| DEFAULT_IMG_DOMAIN.to_string());
        let image_base = parse_base_url("IMG_DOMAIN", &image_base)?;

        let default_link = get("DEFAULT_LINK").unwrap_or_else(|| DEFAULT_LINK.to_string());
        let default_link = Url::parse(&default_link)
            .map_err(|source| ConfigError::InvalidUrl { var: "DEFAULT_LINK", source })?;

        let large_text = get("RPC_LARGE_TEXT").unwrap_or_else(|| DEFAULT_LARGE_TEXT.to_string());

        Ok(Self {
            client_id,
            port,
            image_base,
            default_link,
            large_text,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            image_base: self.image_base.clone(),
            default_link: self.default_link.clone(),
            large_text: self.large_text.clone(),
        }
    }
}

/// Relative paths are joined under the base, so it must end with `/`.
fn parse_base_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let value = if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{}/", value)
    };
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { var, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_client_id_is_set() {
        let config = load(&[("RPC_CLIENT_ID", "1234567890")]).unwrap();
        assert_eq!(config.client_id, 1234567890);
        assert_eq!(config.port, 4242);
        assert_eq!(config.image_base.as_str(), "https://ostjourney.xyz/");
        assert_eq!(config.default_link.as_str(), "https://ostjourney.xyz/");
        assert_eq!(config.large_text, "OST Journey");
    }

    #[test]
    fn client_id_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingClientId)));
        assert!(matches!(
            load(&[("RPC_CLIENT_ID", "   ")]),
            Err(ConfigError::MissingClientId)
        ));
        assert!(matches!(
            load(&[("RPC_CLIENT_ID", "abc")]),
            Err(ConfigError::InvalidClientId(_))
        ));
    }

    #[test]
    fn port_and_domain_overrides() {
        let config = load(&[
            ("RPC_CLIENT_ID", "1"),
            ("WEB_SOCKET_PORT", "9000"),
            ("IMG_DOMAIN", "https://cdn.example.org/covers"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.image_base.as_str(), "https://cdn.example.org/covers/");
        assert_eq!(
            config.image_base.join("a.png").unwrap().as_str(),
            "https://cdn.example.org/covers/a.png"
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("RPC_CLIENT_ID", "1"), ("WEB_SOCKET_PORT", "99999")]),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            load(&[("RPC_CLIENT_ID", "1"), ("IMG_DOMAIN", "not a url")]),
            Err(ConfigError::InvalidUrl { var: "IMG_DOMAIN", .. })
        ));
    }
}
