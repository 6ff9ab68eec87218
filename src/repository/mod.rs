// ==========================================
// BOM 引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 实现引擎网关 trait，屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod catalog_repo;
pub mod error;
pub mod memory_repo;
pub mod production_order_repo;

// 重导出核心仓储
pub use catalog_repo::{assoc_types, feature_appl_types, CatalogRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use memory_repo::{InMemoryCatalog, InMemoryOrderGateway, RecordedOrder};
pub use production_order_repo::{
    OrderFulfillmentEntity, OrderPrecedenceEntity, ProductionOrderEntity,
    ProductionOrderRepository,
};
