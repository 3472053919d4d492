use crate::error::{AppError, AppResult, ConfigError, FileError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 运行环境，决定使用哪一个 LLM 端点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    /// 本地 / 测试环境的 LLM 服务
    Dev,
    /// 线上托管的 LLM 服务
    Prod,
}

impl AppEnv {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Some(AppEnv::Dev),
            "prod" | "production" => Some(AppEnv::Prod),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 运行环境
    pub app_env: AppEnv,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_dev_api_key: String,
    pub llm_dev_api_base_url: String,
    pub llm_temperature: f32,
    pub llm_timeout_secs: u64,
    // --- 服务配置 ---
    pub server_host: String,
    pub server_port: u16,
    /// Excel 文件输出目录
    pub download_dir: PathBuf,
    // --- 迭代配置 ---
    /// 评审通过分数线
    pub pass_threshold: f64,
    /// 最多生成次数
    pub max_iterations: u32,
    /// 单个 Agent 最多与 LLM 往返的轮数
    pub max_agent_turns: usize,
    // --- 会话配置 ---
    /// 会话空闲多久后释放（秒）
    pub session_idle_secs: u64,
    // --- SQL 工具 ---
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_env: AppEnv::Prod,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
            llm_dev_api_key: String::new(),
            llm_dev_api_base_url: "http://localhost:8000/api/v1".to_string(),
            llm_temperature: 0.7,
            llm_timeout_secs: 120,
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            download_dir: PathBuf::from("downloads"),
            pass_threshold: 90.0,
            max_iterations: 3,
            max_agent_turns: 8,
            session_idle_secs: 1800,
            database_url: None,
        }
    }
}

/// `testcase.toml` 中允许出现的字段，全部可选
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    app_env: Option<AppEnv>,
    verbose_logging: Option<bool>,
    llm_api_base_url: Option<String>,
    llm_model_name: Option<String>,
    llm_dev_api_base_url: Option<String>,
    llm_temperature: Option<f32>,
    llm_timeout_secs: Option<u64>,
    server_host: Option<String>,
    server_port: Option<u16>,
    download_dir: Option<PathBuf>,
    pass_threshold: Option<f64>,
    max_iterations: Option<u32>,
    max_agent_turns: Option<usize>,
    session_idle_secs: Option<u64>,
    database_url: Option<String>,
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（可选）→ 环境变量
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("TESTCASE_CONFIG").unwrap_or_else(|_| "testcase.toml".to_string());
        let mut config = Self::default();
        if Path::new(&path).exists() {
            config = config.merge_file(Path::new(&path))?;
        }
        config.apply_env()?;
        Ok(config.normalized())
    }

    /// 只从环境变量加载（不读取 TOML 文件）
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config.normalized())
    }

    fn merge_file(mut self, path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let file: FileConfig = toml::from_str(&content).map_err(|source| {
            AppError::File(FileError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })
        })?;

        if let Some(v) = file.app_env {
            self.app_env = v;
        }
        if let Some(v) = file.verbose_logging {
            self.verbose_logging = v;
        }
        if let Some(v) = file.llm_api_base_url {
            self.llm_api_base_url = v;
        }
        if let Some(v) = file.llm_model_name {
            self.llm_model_name = v;
        }
        if let Some(v) = file.llm_dev_api_base_url {
            self.llm_dev_api_base_url = v;
        }
        if let Some(v) = file.llm_temperature {
            self.llm_temperature = v;
        }
        if let Some(v) = file.llm_timeout_secs {
            self.llm_timeout_secs = v;
        }
        if let Some(v) = file.server_host {
            self.server_host = v;
        }
        if let Some(v) = file.server_port {
            self.server_port = v;
        }
        if let Some(v) = file.download_dir {
            self.download_dir = v;
        }
        if let Some(v) = file.pass_threshold {
            self.pass_threshold = v;
        }
        if let Some(v) = file.max_iterations {
            self.max_iterations = v;
        }
        if let Some(v) = file.max_agent_turns {
            self.max_agent_turns = v;
        }
        if let Some(v) = file.session_idle_secs {
            self.session_idle_secs = v;
        }
        if file.database_url.is_some() {
            self.database_url = file.database_url;
        }
        Ok(self)
    }

    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(v) = std::env::var("APP_ENV") {
            self.app_env = AppEnv::parse(&v).ok_or_else(|| parse_error("APP_ENV", &v, "dev|prod"))?;
        }
        if let Some(v) = env_parsed("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("DEEPSEEK_API_KEY")) {
            self.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Ok(v) = std::env::var("LLM_DEV_API_KEY") {
            self.llm_dev_api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_DEV_API_BASE_URL") {
            self.llm_dev_api_base_url = v;
        }
        if let Some(v) = env_parsed("LLM_TEMPERATURE", "f32")? {
            self.llm_temperature = v;
        }
        if let Some(v) = env_parsed("LLM_TIMEOUT_SECS", "u64")? {
            self.llm_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("SERVER_HOST") {
            self.server_host = v;
        }
        if let Some(v) = env_parsed("SERVER_PORT", "u16")? {
            self.server_port = v;
        }
        if let Ok(v) = std::env::var("DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parsed("PASS_THRESHOLD", "f64")? {
            self.pass_threshold = v;
        }
        if let Some(v) = env_parsed("MAX_ITERATIONS", "u32")? {
            self.max_iterations = v;
        }
        if let Some(v) = env_parsed("MAX_AGENT_TURNS", "usize")? {
            self.max_agent_turns = v;
        }
        if let Some(v) = env_parsed("SESSION_IDLE_SECS", "u64")? {
            self.session_idle_secs = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database_url = Some(v);
            }
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.max_iterations = self.max_iterations.max(1);
        self.max_agent_turns = self.max_agent_turns.max(1);
        self.session_idle_secs = self.session_idle_secs.max(1);
        self.pass_threshold = self.pass_threshold.clamp(0.0, 100.0);
        self
    }

    /// 当前环境实际使用的 LLM 端点与密钥
    pub fn llm_endpoint(&self) -> (&str, &str) {
        match self.app_env {
            AppEnv::Dev => (&self.llm_dev_api_base_url, &self.llm_dev_api_key),
            AppEnv::Prod => (&self.llm_api_base_url, &self.llm_api_key),
        }
    }

    /// 生产环境必须提供 API 密钥
    pub fn require_api_key(&self) -> AppResult<()> {
        if self.app_env == AppEnv::Prod && self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "LLM_API_KEY".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn env_parsed<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| parse_error(var_name, &value, expected_type)),
        Err(_) => Ok(None),
    }
}

fn parse_error(var_name: &str, value: &str, expected_type: &str) -> AppError {
    ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: expected_type.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.pass_threshold, 90.0);
        assert_eq!(config.llm_model_name, "deepseek-chat");
        assert_eq!(config.session_idle_secs, 1800);
        assert_eq!(config.llm_endpoint().0, "https://api.deepseek.com");
    }

    #[test]
    fn test_app_env_parse() {
        assert_eq!(AppEnv::parse("DEV"), Some(AppEnv::Dev));
        assert_eq!(AppEnv::parse("production"), Some(AppEnv::Prod));
        assert_eq!(AppEnv::parse("staging"), None);
    }

    #[test]
    fn test_dev_endpoint_selected() {
        let config = Config {
            app_env: AppEnv::Dev,
            ..Default::default()
        };
        assert_eq!(config.llm_endpoint().0, "http://localhost:8000/api/v1");
        // 开发环境不强制要求密钥
        assert!(config.require_api_key().is_ok());
    }

    #[test]
    fn test_prod_requires_key() {
        let config = Config::default();
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_normalized_clamps_budgets() {
        let config = Config {
            max_iterations: 0,
            max_agent_turns: 0,
            pass_threshold: 150.0,
            session_idle_secs: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.max_iterations, 1);
        assert_eq!(config.max_agent_turns, 1);
        assert_eq!(config.session_idle_secs, 1);
        assert_eq!(config.pass_threshold, 100.0);
    }

    #[test]
    fn test_merge_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "app_env = \"dev\"\nmax_iterations = 5\npass_threshold = 80.0\ndownload_dir = \"out\"\nsession_idle_secs = 60"
        )
        .unwrap();

        let config = Config::default().merge_file(file.path()).unwrap();
        assert_eq!(config.app_env, AppEnv::Dev);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.pass_threshold, 80.0);
        assert_eq!(config.download_dir, PathBuf::from("out"));
        assert_eq!(config.session_idle_secs, 60);
        // 未出现的字段保持默认
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn test_merge_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_iterations = \"three\"").unwrap();
        let err = Config::default().merge_file(file.path()).unwrap_err();
        assert!(matches!(err, AppError::File(FileError::TomlParseFailed { .. })));
    }
}
