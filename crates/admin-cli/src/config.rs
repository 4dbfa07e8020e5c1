use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SERVER: &str = "http://localhost:8080";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub server: Option<String>,
    pub token: Option<String>,
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "backoffice", "backoffice")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Server URL, command-line override first.
    pub fn server(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.remote.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_precedence() {
        let mut config = Config::default();
        assert_eq!(config.server(None), DEFAULT_SERVER);
        config.remote.server = Some("https://admin.example.com".into());
        assert_eq!(config.server(None), "https://admin.example.com");
        assert_eq!(config.server(Some("http://127.0.0.1:9000".into())), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config {
            remote: RemoteConfig {
                server: Some("http://localhost:8080".into()),
                token: Some("abc".into()),
            },
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[remote]"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.remote.token.as_deref(), Some("abc"));
    }
}
