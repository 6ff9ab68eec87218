// ==========================================
// BOM 引擎 - 领域模型层
// ==========================================
// 职责: 定义产品、BOM 边、制造规则、生产订单等实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod bom;
pub mod order;
pub mod product;
pub mod rule;
pub mod types;

// 重导出核心类型
pub use bom::BomEdge;
pub use order::{
    ManufacturingOrderOutcome, ProductionOrderRef, ProductionOrderRequest, SourceOrderLine,
};
pub use product::{matching_variants, Product, SelectedFeature};
pub use rule::{ManufacturingRule, RuleScope};
pub use types::{bom_types, days_to_duration, is_date_valid, ProductType, RuleOperator, TraversalMode};
