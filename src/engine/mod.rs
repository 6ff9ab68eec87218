// ==========================================
// BOM 引擎 - 引擎层
// ==========================================
// 职责: BOM 树构建、配置器、数量传递、制造订单级联
// 红线: Engine 不拼 SQL，只经由网关 trait 访问数据
// ==========================================

pub mod bom_node;
pub mod bom_tree;
pub mod configurator;
pub mod error;
pub mod gateway;
pub mod order_cascade;
pub mod scrap;

// 重导出核心引擎
pub use bom_node::{BomNode, NodeId};
pub use bom_tree::{BomTree, BomTreeRequest};
pub use configurator::{
    ChildCandidate, Configurator, Resolution, ResolutionStrategy, RuleContext,
};
pub use error::{BomError, BomResult};
pub use gateway::{
    BomGateways, CatalogGateway, CustomCalcInput, CustomQuantityCalculator,
    ProductionOrderGateway,
};
pub use order_cascade::{ManufacturingOrderCascade, ManufacturingOrderRequest};
