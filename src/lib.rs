// ==========================================
// BOM 引擎 - 核心库
// ==========================================
// 职责: 物料清单树构建（展开/反查/单层/制造展开）、
//       虚拟产品配置、数量传递与汇总、制造订单级联
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 目录与生产订单访问
pub mod repository;

// 引擎层 - BOM 树与配置器
pub mod engine;

// 配置层 - 引擎配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能埋点
pub mod perf;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    BomEdge, ManufacturingOrderOutcome, ManufacturingRule, Product, ProductType, RuleOperator,
    SelectedFeature, SourceOrderLine, TraversalMode,
};

// 引擎
pub use engine::{
    BomError, BomGateways, BomNode, BomResult, BomTree, BomTreeRequest, ManufacturingOrderCascade,
    ManufacturingOrderRequest, NodeId,
};

// API
pub use api::{ApiError, ApiResult, BomService};

// 配置
pub use config::BomEngineConfig;

// ==========================================
// 常量定义
// ==========================================

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "BOM 引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
