use std::{collections::HashMap, env, fs, path::PathBuf, sync::OnceLock, time::Duration};

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::{
    error::{RefreshError, Result},
    ledger::DEFAULT_DATA_DIR,
};

pub const DEFAULT_CONFIG_FILE: &str = "refresh-pause.toml";
const DEFAULT_API_VERSION: &str = "3.11";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    server: ServerSection,
    ledger: Option<LedgerSection>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    url: String,
    api_version: Option<String>,
    #[serde(default)]
    site_url: String,
    token_name: String,
    token_secret: String,
    timeout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LedgerSection {
    data_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub url: String,
    pub api_version: String,
    pub site_url: String,
    pub token_name: String,
    pub token_secret: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub server: ServerConfig,
    pub data_dir: PathBuf,
}

pub fn load_config(config_path: &str) -> Result<Configuration> {
    let contents = fs::read_to_string(config_path)?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<Configuration> {
    let config: ConfigFile = toml::from_str(contents)?;
    process_config(config)
}

fn process_config(config: ConfigFile) -> Result<Configuration> {
    let variables = with_builtin_variables(config.variables);

    let server = config.server;
    let url = substitute_variables(&server.url, &variables)
        .trim_end_matches('/')
        .to_string();
    if url.is_empty() {
        return Err(RefreshError::Config("server.url must not be empty".to_string()));
    }

    let timeout = server
        .timeout
        .as_deref()
        .map(|t| parse_timeout(&substitute_variables(t, &variables)))
        .transpose()?
        .flatten();

    let data_dir = config
        .ledger
        .and_then(|l| l.data_dir)
        .map(|d| substitute_variables(&d, &variables))
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

    Ok(Configuration {
        server: ServerConfig {
            url,
            api_version: server
                .api_version
                .map(|v| substitute_variables(&v, &variables))
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            site_url: substitute_variables(&server.site_url, &variables),
            token_name: substitute_variables(&server.token_name, &variables),
            token_secret: substitute_variables(&server.token_secret, &variables),
            timeout,
        },
        data_dir: PathBuf::from(data_dir),
    })
}

/// `"0"` or an empty string disables the timeout.
fn parse_timeout(timeout: &str) -> Result<Option<Duration>> {
    if timeout == "0" || timeout.is_empty() {
        return Ok(None);
    }

    timeout
        .parse::<humantime::Duration>()
        .map(|d| Some(d.into()))
        .map_err(|e| {
            RefreshError::Config(format!(
                "invalid timeout '{}': {} (use a duration like '30s', '5m', '1h30m')",
                timeout, e
            ))
        })
}

/// Adds `ENV_*` and `PWD`; variables declared in the file take precedence.
fn with_builtin_variables(mut variables: HashMap<String, String>) -> HashMap<String, String> {
    let env_vars = env::vars().map(|(key, value)| (format!("ENV_{key}"), value));
    let pwd = env::current_dir()
        .ok()
        .map(|dir| ("PWD".to_string(), dir.display().to_string()));

    for (key, value) in env_vars.chain(pwd) {
        variables.entry(key).or_insert(value);
    }
    variables
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)\b)")
            .expect("variable pattern is valid")
    })
}

/// Expands `${NAME}` and `$NAME`. Unknown names are left as written.
fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    variable_pattern()
        .replace_all(text, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            variables
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
