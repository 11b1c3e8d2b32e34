use std::fmt;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{debug, info};

use crate::constants;
use crate::error::{RagError, Result};

/// Retrieval-augmented chat grounded in a managed search index.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        long,
        env = "PROJECT_CONNECTION",
        help = "Project connection string: <host>;<subscription>;<resource group>;<project>."
    )]
    pub project_connection: Option<String>,

    #[arg(
        long,
        env = "MODEL_DEPLOYMENT",
        help = "Name of the chat-completions model deployment."
    )]
    pub model_deployment: Option<String>,

    #[arg(long, env = "INDEX_NAME", help = "Search index to ground answers in.")]
    pub index_name: Option<String>,

    #[arg(
        long,
        env = "OPENAI_API_VERSION",
        default_value = constants::DEFAULT_OPENAI_API_VERSION,
        help = "api-version for chat completions."
    )]
    pub api_version: String,

    #[arg(
        long,
        env = "SYSTEM_PROMPT",
        default_value = constants::DEFAULT_SYSTEM_PROMPT,
        help = "System message that opens the conversation."
    )]
    pub system_prompt: String,

    #[arg(long, help = "Load settings from this file instead of ./.env.")]
    pub env_file: Option<PathBuf>,

    #[arg(long, help = "Don't clear the screen on startup.")]
    pub no_clear: bool,

    #[arg(long, help = "Print the sources the answer was grounded in.")]
    pub citations: bool,

    #[arg(long, help = "Print the resolved settings and exit.")]
    pub print_config: bool,
}

/// Loads environment variables from `env_file`, or from `./.env` when none is
/// given. A missing `./.env` is fine; a missing explicit file is not.
/// Variables already present in the environment are never overwritten.
pub fn load_dotenv(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                RagError::Config(format!("cannot load env file {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), "Loaded environment file");
        }
        None => match dotenvy::dotenv() {
            Ok(path) => info!(path = %path.display(), "Loaded environment file"),
            Err(e) => debug!("No .env loaded: {}", e),
        },
    }
    Ok(())
}

/// The four parts of a project connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConnection {
    pub host: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub project_name: String,
}

impl ProjectConnection {
    pub fn parse(conn_str: &str) -> Result<Self> {
        let parts: Vec<&str> = conn_str.trim().split(';').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RagError::Config(format!(
                "project connection string must have 4 ';'-separated parts, found {}",
                parts.len()
            )));
        }
        if let Some(idx) = parts.iter().position(|p| p.is_empty()) {
            return Err(RagError::Config(format!(
                "project connection string has an empty part at position {}",
                idx + 1
            )));
        }

        Ok(Self {
            host: parts[0].to_string(),
            subscription_id: parts[1].to_string(),
            resource_group: parts[2].to_string(),
            project_name: parts[3].to_string(),
        })
    }

    /// `https://<host>`, unless the host already names a scheme.
    pub fn endpoint(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host.trim_end_matches('/'))
        }
    }

    /// Resource path of the project below the endpoint.
    pub fn workspace_path(&self) -> String {
        format!(
            "/agents/v1.0/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
            self.subscription_id, self.resource_group, self.project_name
        )
    }
}

impl fmt::Display for ProjectConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.host, self.subscription_id, self.resource_group, self.project_name
        )
    }
}

/// Fully resolved, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project: ProjectConnection,
    pub model_deployment: String,
    pub index_name: String,
    pub api_version: String,
    pub system_prompt: String,
    pub clear_screen: bool,
    pub show_citations: bool,
}

fn required(value: Option<String>, env_name: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RagError::Config(format!(
            "{} is not set (use --{} or the {} environment variable)",
            env_name,
            env_name.to_lowercase().replace('_', "-"),
            env_name
        ))),
    }
}

impl Settings {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let conn_str = required(cli.project_connection, "PROJECT_CONNECTION")?;
        let model_deployment = required(cli.model_deployment, "MODEL_DEPLOYMENT")?;
        let index_name = required(cli.index_name, "INDEX_NAME")?;

        Ok(Self {
            project: ProjectConnection::parse(&conn_str)?,
            model_deployment,
            index_name,
            api_version: cli.api_version,
            system_prompt: cli.system_prompt,
            clear_screen: !cli.no_clear,
            show_citations: cli.citations,
        })
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "project_endpoint: {}", self.project.endpoint())?;
        writeln!(f, "subscription_id: {}", self.project.subscription_id)?;
        writeln!(f, "resource_group: {}", self.project.resource_group)?;
        writeln!(f, "project_name: {}", self.project.project_name)?;
        writeln!(f, "model_deployment: {}", self.model_deployment)?;
        writeln!(f, "index_name: {}", self.index_name)?;
        writeln!(f, "api_version: {}", self.api_version)?;
        write!(f, "system_prompt: {}", self.system_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ragchat"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_connection_string() {
        let conn = ProjectConnection::parse("eastus.api.azureml.ms;sub-1;rg-1;proj-1").unwrap();
        assert_eq!(conn.host, "eastus.api.azureml.ms");
        assert_eq!(conn.subscription_id, "sub-1");
        assert_eq!(conn.resource_group, "rg-1");
        assert_eq!(conn.project_name, "proj-1");
        assert_eq!(conn.endpoint(), "https://eastus.api.azureml.ms");
        assert_eq!(conn.to_string(), "eastus.api.azureml.ms;sub-1;rg-1;proj-1");
    }

    #[test]
    fn test_parse_connection_string_trims_whitespace() {
        let conn = ProjectConnection::parse("  host ; sub ;rg; proj\n").unwrap();
        assert_eq!(conn.host, "host");
        assert_eq!(conn.project_name, "proj");
    }

    #[test]
    fn test_parse_connection_string_wrong_part_count() {
        let err = ProjectConnection::parse("host;sub;rg").unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(err.to_string().contains("found 3"));

        assert!(ProjectConnection::parse("a;b;c;d;e").is_err());
    }

    #[test]
    fn test_parse_connection_string_empty_part() {
        let err = ProjectConnection::parse("host;;rg;proj").unwrap_err();
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn test_endpoint_keeps_explicit_scheme() {
        let conn = ProjectConnection::parse("http://127.0.0.1:8080/;s;r;p").unwrap();
        assert_eq!(conn.endpoint(), "http://127.0.0.1:8080");
        assert_eq!(
            conn.workspace_path(),
            "/agents/v1.0/subscriptions/s/resourceGroups/r/providers/Microsoft.MachineLearningServices/workspaces/p"
        );
    }

    #[test]
    fn test_settings_from_cli() {
        let settings = Settings::from_cli(cli(&[
            "--project-connection",
            "host;sub;rg;proj",
            "--model-deployment",
            "gpt-4o",
            "--index-name",
            "margies-index",
            "--no-clear",
        ]))
        .unwrap();

        assert_eq!(settings.model_deployment, "gpt-4o");
        assert_eq!(settings.index_name, "margies-index");
        assert!(!settings.clear_screen);
        assert!(!settings.show_citations);
        assert_eq!(settings.project.project_name, "proj");
    }

    #[test]
    fn test_settings_missing_value_names_variable() {
        let mut parsed = cli(&[]);
        parsed.project_connection = Some("host;sub;rg;proj".to_string());
        parsed.model_deployment = Some("gpt-4o".to_string());
        parsed.index_name = Some("   ".to_string());

        let err = Settings::from_cli(parsed).unwrap_err();
        assert!(err.to_string().contains("INDEX_NAME"));
        assert!(err.to_string().contains("--index-name"));
    }
}
