use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// Word 文档解析错误
    #[error("文档错误: {0}")]
    Document(#[from] DocumentError),
    /// Excel 导出错误
    #[error("导出错误: {0}")]
    Export(#[from] ExportError),
    /// SQL 工具错误
    #[error("SQL错误: {0}")]
    Sql(#[from] SqlError),
    /// 会话错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 流式调用失败
    #[error("LLM 流式调用失败 (模型: {model}): {source}")]
    StreamFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回结果为空
    #[error("LLM返回结果为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 请求构建失败
    #[error("LLM 请求构建失败: {0}")]
    InvalidRequest(String),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 非法文件名（路径穿越等）
    #[error("非法文件名: {name}")]
    InvalidName { name: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Word 文档解析错误
#[derive(Debug, Error)]
pub enum DocumentError {
    /// 缺少输入
    #[error("必须提供file_path或base64_data参数")]
    MissingInput,
    /// 不支持的文件格式
    #[error("不支持的文件格式 - {extension}，仅支持 .docx 或 .doc 格式")]
    UnsupportedFormat { extension: String },
    /// base64 解码失败
    #[error("base64数据解码失败 - {0}")]
    Base64(#[from] base64::DecodeError),
    /// 不是有效的 docx 压缩包
    #[error("无法作为 docx 读取: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// XML 解析失败
    #[error("XML 解析失败: {0}")]
    Xml(#[from] quick_xml::Error),
    /// 读取压缩包内容失败
    #[error("读取文档内容失败: {0}")]
    Io(#[from] std::io::Error),
}

/// Excel 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    /// 测试用例列表为空
    #[error("测试用例列表为空")]
    EmptyTestCases,
    /// 写入 xlsx 压缩包失败
    #[error("写入 xlsx 失败 ({path}): {source}")]
    ArchiveFailed {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// SQL 工具错误
#[derive(Debug, Error)]
pub enum SqlError {
    /// SQL 语句为空
    #[error("SQL语句为空")]
    EmptyStatement,
    /// 不是 SELECT 语句
    #[error("只允许执行SELECT查询语句，当前SQL语句以 '{prefix}...' 开头")]
    NotSelect { prefix: String },
    /// 包含危险关键字
    #[error("SQL语句包含危险操作 '{keyword}'，只允许执行SELECT查询语句")]
    ForbiddenKeyword { keyword: String },
    /// 未配置数据库
    #[error("数据库管理器未初始化")]
    NotConfigured,
    /// 不支持的数据库类型
    #[error("不支持的数据库连接: {url}")]
    UnsupportedBackend { url: String },
    /// 数据库执行失败
    #[error("{0}")]
    Database(#[from] sqlx::Error),
}

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 会话任务已退出
    #[error("会话 {thread_id} 已关闭")]
    Closed { thread_id: String },
    /// 生成失败（多次迭代后仍无测试用例）
    #[error("经过 {iterations} 次迭代仍未生成有效的测试用例")]
    NoTestCases { iterations: u32 },
    /// 输入为空
    #[error("输入内容为空")]
    EmptyInput,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 缺少 API 密钥
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<async_openai::error::OpenAIError> for LlmError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        LlmError::InvalidRequest(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 不带分类前缀的错误信息，用于返回给 LLM 的工具结果
    pub fn detail(&self) -> String {
        match self {
            AppError::Llm(e) => e.to_string(),
            AppError::File(e) => e.to_string(),
            AppError::Document(e) => e.to_string(),
            AppError::Export(e) => e.to_string(),
            AppError::Sql(e) => e.to_string(),
            AppError::Session(e) => e.to_string(),
            AppError::Config(e) => e.to_string(),
            AppError::Other(message) => message.clone(),
        }
    }

    /// 是否属于调用方输入问题（映射为 HTTP 400）
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            AppError::File(FileError::InvalidName { .. })
                | AppError::Session(SessionError::EmptyInput)
                | AppError::Document(DocumentError::MissingInput)
                | AppError::Document(DocumentError::UnsupportedFormat { .. })
                | AppError::Document(DocumentError::Base64(_))
        )
    }

    /// 是否属于资源不存在（映射为 HTTP 404）
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::File(FileError::NotFound { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_error_messages_match_tool_output() {
        let err = SqlError::ForbiddenKeyword {
            keyword: "DROP".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "SQL语句包含危险操作 'DROP'，只允许执行SELECT查询语句"
        );
    }

    #[test]
    fn test_status_classification() {
        let invalid = AppError::File(FileError::InvalidName {
            name: "../x".to_string(),
        });
        assert!(invalid.is_bad_request());
        assert!(!invalid.is_not_found());

        let missing = AppError::File(FileError::NotFound {
            path: "a.xlsx".to_string(),
        });
        assert!(missing.is_not_found());

        let other = AppError::Other("boom".to_string());
        assert!(!other.is_bad_request());
        assert!(!other.is_not_found());
    }
}
