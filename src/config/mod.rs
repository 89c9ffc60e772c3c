use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_PHASE_TOOL: &str = "update_phase";
pub const PROJECT_CONFIG_DIR: &str = ".assistant-relay";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub listen: String,
    pub http: HttpConfig,
    pub run: RunConfig,
    pub tools: ToolsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            assistant_id: None,
            listen: DEFAULT_LISTEN.to_string(),
            http: HttpConfig::default(),
            run: RunConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Transport settings for the remote assistants API.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
    pub respect_retry_after: bool,
    /// Upper bound on any single retry wait, `Retry-After` included.
    pub max_retry_wait_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
            max_retries: 2,
            retry_base_ms: 500,
            retry_jitter_ms: 250,
            respect_retry_after: true,
            max_retry_wait_ms: 10_000,
        }
    }
}

/// Poll loop bounds for a single run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub backoff_factor: f64,
    pub max_action_rounds: usize,
    pub run_timeout_ms: u64,
    pub tool_timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_poll_interval_ms: 5_000,
            backoff_factor: 1.5,
            max_action_rounds: 16,
            run_timeout_ms: 120_000,
            tool_timeout_ms: 30_000,
        }
    }
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Next wait after a non-terminal poll, capped at `max_poll_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        current.mul_f64(factor).min(self.max_poll_interval())
    }
}

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub phase_tool: String,
    pub sheet: Option<SheetConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            phase_tool: DEFAULT_PHASE_TOOL.to_string(),
            sheet: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SheetConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub listen: Option<String>,
    pub http: Option<PartialHttpConfig>,
    pub run: Option<PartialRunConfig>,
    pub tools: Option<PartialToolsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialHttpConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_base_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    pub respect_retry_after: Option<bool>,
    pub max_retry_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialRunConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_poll_interval_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_action_rounds: Option<usize>,
    pub run_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialToolsConfig {
    pub phase_tool: Option<String>,
    pub sheet: Option<SheetConfig>,
}

impl AppConfig {
    pub fn from_cli(cli: &crate::Cli) -> Result<Self> {
        let project_root = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&project_root).unwrap_or_default();
        let file_cfg = match &cli.config {
            Some(path) => load_config_at(path)?,
            None => load_file_config().unwrap_or_default(),
        };

        let mut cfg = Self::merge(project_cfg, file_cfg);

        // CLI flags first, then environment, then whatever the files said
        if let Some(url) = cli
            .base_url
            .clone()
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
        {
            cfg.base_url = url;
        }
        cfg.api_key = cli
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or(cfg.api_key);
        cfg.assistant_id = cli
            .assistant_id
            .clone()
            .or_else(|| std::env::var("ASSISTANT_ID").ok())
            .or(cfg.assistant_id);
        if let Some(listen) = cli
            .listen
            .clone()
            .or_else(|| std::env::var("RELAY_LISTEN").ok())
        {
            cfg.listen = listen;
        }
        Ok(cfg)
    }

    /// Layer the project file over the global file over built-in defaults.
    pub fn merge(project_cfg: FileConfig, file_cfg: FileConfig) -> Self {
        let defaults = AppConfig::default();

        let http = {
            let d = HttpConfig::default();
            let p = merge_http(project_cfg.http, file_cfg.http);
            HttpConfig {
                connect_timeout_ms: p.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
                request_timeout_ms: p.request_timeout_ms.unwrap_or(d.request_timeout_ms),
                max_retries: p.max_retries.unwrap_or(d.max_retries),
                retry_base_ms: p.retry_base_ms.unwrap_or(d.retry_base_ms),
                retry_jitter_ms: p.retry_jitter_ms.unwrap_or(d.retry_jitter_ms),
                respect_retry_after: p.respect_retry_after.unwrap_or(d.respect_retry_after),
                max_retry_wait_ms: p.max_retry_wait_ms.unwrap_or(d.max_retry_wait_ms),
            }
        };

        let run = {
            let d = RunConfig::default();
            let p = merge_run(project_cfg.run, file_cfg.run);
            RunConfig {
                poll_interval_ms: p.poll_interval_ms.unwrap_or(d.poll_interval_ms),
                max_poll_interval_ms: p.max_poll_interval_ms.unwrap_or(d.max_poll_interval_ms),
                backoff_factor: p.backoff_factor.unwrap_or(d.backoff_factor),
                max_action_rounds: p.max_action_rounds.unwrap_or(d.max_action_rounds),
                run_timeout_ms: p.run_timeout_ms.unwrap_or(d.run_timeout_ms),
                tool_timeout_ms: p.tool_timeout_ms.unwrap_or(d.tool_timeout_ms),
            }
        };

        let tools = {
            let (project_tools, file_tools) = (
                project_cfg.tools.unwrap_or_default(),
                file_cfg.tools.unwrap_or_default(),
            );
            ToolsConfig {
                phase_tool: project_tools
                    .phase_tool
                    .or(file_tools.phase_tool)
                    .unwrap_or(defaults.tools.phase_tool),
                // a sheet table is taken whole, never field by field
                sheet: project_tools.sheet.or(file_tools.sheet),
            }
        };

        Self {
            base_url: project_cfg
                .base_url
                .or(file_cfg.base_url)
                .unwrap_or(defaults.base_url),
            api_key: project_cfg.api_key.or(file_cfg.api_key),
            assistant_id: project_cfg.assistant_id.or(file_cfg.assistant_id),
            listen: project_cfg
                .listen
                .or(file_cfg.listen)
                .unwrap_or(defaults.listen),
            http,
            run,
            tools,
        }
    }
}

fn merge_http(
    project: Option<PartialHttpConfig>,
    file: Option<PartialHttpConfig>,
) -> PartialHttpConfig {
    let (p, f) = (project.unwrap_or_default(), file.unwrap_or_default());
    PartialHttpConfig {
        connect_timeout_ms: p.connect_timeout_ms.or(f.connect_timeout_ms),
        request_timeout_ms: p.request_timeout_ms.or(f.request_timeout_ms),
        max_retries: p.max_retries.or(f.max_retries),
        retry_base_ms: p.retry_base_ms.or(f.retry_base_ms),
        retry_jitter_ms: p.retry_jitter_ms.or(f.retry_jitter_ms),
        respect_retry_after: p.respect_retry_after.or(f.respect_retry_after),
        max_retry_wait_ms: p.max_retry_wait_ms.or(f.max_retry_wait_ms),
    }
}

fn merge_run(project: Option<PartialRunConfig>, file: Option<PartialRunConfig>) -> PartialRunConfig {
    let (p, f) = (project.unwrap_or_default(), file.unwrap_or_default());
    PartialRunConfig {
        poll_interval_ms: p.poll_interval_ms.or(f.poll_interval_ms),
        max_poll_interval_ms: p.max_poll_interval_ms.or(f.max_poll_interval_ms),
        backoff_factor: p.backoff_factor.or(f.backoff_factor),
        max_action_rounds: p.max_action_rounds.or(f.max_action_rounds),
        run_timeout_ms: p.run_timeout_ms.or(f.run_timeout_ms),
        tool_timeout_ms: p.tool_timeout_ms.or(f.tool_timeout_ms),
    }
}

pub fn load_file_config() -> Result<FileConfig> {
    fn candidate_paths() -> Vec<PathBuf> {
        let mut v = Vec::new();
        if let Ok(p) = std::env::var("RELAY_CONFIG") {
            v.push(PathBuf::from(p));
        }
        if let Some(dir) = dirs::config_dir() {
            v.push(dir.join("assistant-relay/config.toml"));
        }
        v
    }

    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load an explicitly requested config file. Unlike the search path, a
/// missing or broken file here is an error.
pub fn load_config_at(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg = toml::from_str::<FileConfig>(&s)
        .with_context(|| format!("parse config file: {}", path.display()))?;
    info!(path=%path.display(), "loaded config file");
    Ok(cfg)
}

/// Load project-specific configuration from .assistant-relay/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let project_config_path = project_root.join(PROJECT_CONFIG_DIR).join("config.toml");

    if project_config_path.exists() {
        let s = fs::read_to_string(&project_config_path).with_context(|| {
            format!(
                "read project config file: {}",
                project_config_path.display()
            )
        })?;
        match toml::from_str::<FileConfig>(&s) {
            Ok(cfg) => {
                info!(path=%project_config_path.display(), "loaded project config file");
                Ok(cfg)
            }
            Err(e) => {
                warn!(path=%project_config_path.display(), error=%e.to_string(), "parse project config failed");
                Ok(FileConfig::default())
            }
        }
    } else {
        Ok(FileConfig::default())
    }
}
