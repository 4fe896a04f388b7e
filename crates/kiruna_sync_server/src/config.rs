use std::env;
use std::path::PathBuf;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3001)
    pub port: u16,
    /// Graph configuration document (default: ./graph_configuration.json)
    pub graph_config_path: PathBuf,
    /// CORS allowed origins (comma-separated)
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let graph_config_path = PathBuf::from(
            env::var("GRAPH_CONFIG_PATH")
                .unwrap_or_else(|_| "./graph_configuration.json".to_string()),
        );
        if graph_config_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyGraphConfigPath);
        }

        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".to_string()),
        );

        Ok(Config {
            host,
            port,
            graph_config_path,
            cors_origins,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    EmptyGraphConfigPath,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
            ConfigError::EmptyGraphConfigPath => {
                write!(f, "GRAPH_CONFIG_PATH environment variable is empty")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test,,"),
            vec!["http://a.test", "http://b.test"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_server_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3001,
            graph_config_path: PathBuf::from("graph.json"),
            cors_origins: vec![],
        };
        assert_eq!(config.server_addr(), "127.0.0.1:3001");
    }
}
