// ==========================================
// BOM 引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 数据访问失败统一透传为 RepositoryError，中止本次构建/遍历
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum BomError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("产品不存在: product_id={product_id}")]
    ProductNotFound { product_id: String },

    #[error("BOM 存在循环引用: product_id={product_id}")]
    CycleDetected { product_id: String },

    #[error("BOM 层级超过上限: max_depth={max_depth}, product_id={product_id}")]
    MaxDepthExceeded { max_depth: usize, product_id: String },

    #[error("自定义用量计算失败 (method={method}): {message}")]
    CustomCalculation { method: String, message: String },
}

/// Result 类型别名
pub type BomResult<T> = Result<T, BomError>;
