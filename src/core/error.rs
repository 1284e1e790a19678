use std::io;
use thiserror::Error;

/// 记录存储层的错误
///
/// 读操作遇到"不存在"时返回空结果而不是错误，
/// 这里只描述真正的失败：存储不可读写、文件损坏、输入不合法。
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO错误: 表 {table} 执行 {op} 失败: {source}")]
    Io {
        table: String,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("文件格式错误: 表 {table} 执行 {op} 失败: {source}")]
    Csv {
        table: String,
        op: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("参数错误: {0}")]
    Validation(String),

    #[error("表 {table} 没有列 {column}")]
    UnknownColumn { table: String, column: String },

    #[error("表 {table} 的字段 {field} 无效: {message}")]
    Field {
        table: String,
        field: String,
        message: String,
    },
}

impl StoreError {
    pub(crate) fn io(table: &str, op: &'static str, source: io::Error) -> Self {
        StoreError::Io {
            table: table.to_string(),
            op,
            source,
        }
    }

    pub(crate) fn csv(table: &str, op: &'static str, source: csv::Error) -> Self {
        StoreError::Csv {
            table: table.to_string(),
            op,
            source,
        }
    }

    pub(crate) fn field(table: &str, field: &str, message: impl Into<String>) -> Self {
        StoreError::Field {
            table: table.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    // 获取详细的错误信息
    pub fn detailed_message(&self) -> String {
        self.to_string()
    }

    // 获取简略的错误信息
    pub fn brief_message(&self) -> String {
        match self {
            StoreError::Io { .. } => "Error: IO error".to_string(),
            StoreError::Csv { .. } => "Error: Corrupt table file".to_string(),
            StoreError::Validation(_) => "Error: Invalid input".to_string(),
            StoreError::UnknownColumn { column, .. } => format!("Error: Unknown column {}", column),
            StoreError::Field { field, .. } => format!("Error: Invalid field {}", field),
        }
    }
}

/// 业务层（登录、订票、定位、查询）的错误
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("账号或密码错误")]
    InvalidCredentials,

    #[error("{entity} {id} 不存在")]
    NotFound { entity: &'static str, id: String },

    #[error("重复: {0}")]
    Duplicate(String),

    #[error("参数错误: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
