// ==========================================
// BOM 引擎 - API 层
// ==========================================
// 职责: 对外业务接口，校验输入并把引擎/仓储错误转换为 ApiError
// ==========================================

pub mod bom_service;
pub mod error;

// 重导出核心类型
pub use bom_service::{BomService, ComponentLine, ManufacturingOrdersRequest, UnconfiguredPart};
pub use error::{ApiError, ApiResult};
