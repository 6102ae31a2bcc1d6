use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = ".pr-report.toml";

/// Dotfile in the home directory holding the GitHub token.
pub const TOKEN_FILE: &str = ".pr_token";

/// Environment variable with a comma separated list of logins to leave out.
pub const EXCLUDE_ENV: &str = "PR_EXCLUDE_USERS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine the home directory to locate .pr_token")]
    NoHomeDir,

    #[error("Failed to read token file {}: {source}", .path.display())]
    TokenRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level configuration loaded from `.pr-report.toml`.
///
/// All fields are optional; the tools work with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// REST API root. Point this at `https://host/api/v3` for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Where the CSV report is written
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// File name searched for when enriching with code owners
    #[serde(default = "default_ownership_file")]
    pub ownership_file: String,

    /// Logins always removed from the resolved authors
    #[serde(default)]
    pub exclude_users: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            ownership_file: default_ownership_file(),
            exclude_users: Vec::new(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("pr_report.csv")
}

fn default_ownership_file() -> String {
    "CODEOWNERS".to_string()
}

impl Config {
    /// Load configuration from `.pr-report.toml` in the current directory.
    /// Returns the default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Logins to exclude: the configured list plus `PR_EXCLUDE_USERS`.
    pub fn excluded_users(&self) -> BTreeSet<String> {
        let from_env = std::env::var(EXCLUDE_ENV).unwrap_or_default();
        self.excluded_users_with(&from_env)
    }

    fn excluded_users_with(&self, env_value: &str) -> BTreeSet<String> {
        self.report
            .exclude_users
            .iter()
            .map(|login| login.trim().to_string())
            .filter(|login| !login.is_empty())
            .chain(parse_login_list(env_value))
            .collect()
    }
}

/// Split a comma separated list, trimming entries and dropping blanks.
pub fn parse_login_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the GitHub token: the explicit flag wins, otherwise `~/.pr_token`
/// is read with its trailing newline trimmed.
pub fn resolve_token(flag: Option<&str>) -> Result<String, ConfigError> {
    if let Some(token) = flag {
        return Ok(token.to_string());
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    read_token_file(&home.join(TOKEN_FILE))
}

fn read_token_file(path: &Path) -> Result<String, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::TokenRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.report.output, PathBuf::from("pr_report.csv"));
        assert_eq!(config.report.ownership_file, "CODEOWNERS");
        assert!(config.report.exclude_users.is_empty());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
api_url = "https://ghe.example.com/api/v3"

[report]
exclude_users = ["dependabot", "renovate"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.report.exclude_users.len(), 2);
        assert_eq!(config.report.output, PathBuf::from("pr_report.csv"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("pr_report_test_config.toml");
        fs::write(&path, "[report]\noutput = \"weekly.csv\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.report.output, PathBuf::from("weekly.csv"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_parse_login_list() {
        assert_eq!(parse_login_list("bob, carol,,"), vec!["bob", "carol"]);
        assert!(parse_login_list("").is_empty());
    }

    #[test]
    fn test_excluded_users_merges_env_and_config() {
        let mut config = Config::default();
        config.report.exclude_users = vec!["dependabot".to_string()];
        let excluded = config.excluded_users_with("bob,dependabot");
        let excluded: Vec<_> = excluded.into_iter().collect();
        assert_eq!(excluded, vec!["bob", "dependabot"]);
    }

    #[test]
    fn test_flag_token_wins() {
        assert_eq!(resolve_token(Some("abc123")).unwrap(), "abc123");
    }

    #[test]
    fn test_token_file_trailing_newline_trimmed() {
        let path = std::env::temp_dir().join("pr_report_test_token");
        fs::write(&path, "ghp_secret\n").unwrap();
        assert_eq!(read_token_file(&path).unwrap(), "ghp_secret");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_token_file_names_path() {
        let path = std::env::temp_dir().join("pr_report_missing_token_file");
        let err = read_token_file(&path).unwrap_err();
        assert!(err.to_string().contains("pr_report_missing_token_file"));
    }
}
