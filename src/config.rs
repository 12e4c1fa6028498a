use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_BIND_PORT: u16 = 5001;
const DEFAULT_BASE_INTERPRETER: &str = "python3";
const DEFAULT_COMPILER: &str = "gcc";
const ENV_DIR_NAME: &str = "user_venv";

#[derive(Parser)]
#[command(name = "playground", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Create the isolated runtime before accepting requests
    #[arg(long = "provision-on-startup", default_value_t = false)]
    pub provision_on_startup: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file, or the defaults
    pub fn to_config(&self) -> std::io::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub compiler: CompilerConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
    pub workers: Option<usize>,
}

impl ServerConfig {
    pub fn address(&self) -> (String, u16) {
        (
            self.bind_address
                .clone()
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            self.bind_port.unwrap_or(DEFAULT_BIND_PORT),
        )
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct RuntimeConfig {
    /// Where the isolated runtime lives
    pub env_dir: Option<PathBuf>,
    /// Interpreter used once to create the isolated runtime
    pub base_interpreter: Option<String>,
}

impl RuntimeConfig {
    pub fn env_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.env_dir {
            return Ok(dir.clone());
        }

        use directories::ProjectDirs;

        let proj_dirs = ProjectDirs::from("", "", "playground")
            .ok_or_else(|| anyhow::anyhow!("Unable to find user directory"))?;
        Ok(proj_dirs.data_local_dir().join(ENV_DIR_NAME))
    }

    pub fn base_interpreter(&self) -> &str {
        self.base_interpreter
            .as_deref()
            .unwrap_or(DEFAULT_BASE_INTERPRETER)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct CompilerConfig {
    pub command: Option<String>,
}

impl CompilerConfig {
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_COMPILER)
    }
}
