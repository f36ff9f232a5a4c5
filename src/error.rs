//! Error types for document synthesis.
//!
//! Per-route conditions (`UnresolvedRuleSet`, `MalformedRule`) are normally
//! recovered by the operation builder and turned into diagnostics; per-group
//! conditions abort the document of that group only. See [`crate::generator`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library
#[derive(Debug, Error)]
pub enum Error {
    /// A validation declaration names a rule set or scene that does not exist.
    #[error("无法解析规则集 {rule_set} (scene: {})", .scene.as_deref().unwrap_or("-"))]
    UnresolvedRuleSet {
        rule_set: String,
        scene: Option<String>,
    },

    /// A route is bound to a server group that is not configured.
    #[error("路由 {route} 绑定的服务器 [{group}] 未配置")]
    UnboundServerGroup { route: String, group: String },

    /// A rule value is empty or cannot be tokenized.
    #[error("规则格式错误 {field}: {reason}")]
    MalformedRule { field: String, reason: String },

    /// Two routes resolved to the same (path, method) or the same operationId.
    #[error("operationId 冲突 {operation_id}: {method} {path} 已由 {existing} 注册")]
    OperationIdCollision {
        operation_id: String,
        path: String,
        method: String,
        existing: String,
    },

    /// A schema references a definition that is not in the registry.
    #[error("引用了不存在的定义 {name} (位于 {location})")]
    DanglingDefinitionReference { name: String, location: String },

    /// A definition name was registered twice with different shapes.
    #[error("定义 {name} 已存在且结构不同")]
    DefinitionConflict { name: String },

    /// Writing the serialized document failed.
    #[error("写入文件失败 {}: {source}", .path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration resolves no server group at all.
    #[error("没有可用的服务器分组")]
    NoServerGroups,

    /// Configuration is structurally invalid.
    #[error("无效配置: {0}")]
    InvalidConfig(String),

    /// A manifest file could not be decoded.
    #[error("解析错误 {}: {message}", .file.display())]
    ManifestParse { file: PathBuf, message: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error only concerns the route being processed.
    pub fn is_route_scoped(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedRuleSet { .. } | Error::MalformedRule { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON 序列化错误: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(format!("YAML 序列化错误: {}", err))
    }
}
