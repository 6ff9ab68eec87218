// ==========================================
// BOM 引擎 - 生产订单领域模型
// ==========================================
// 职责: 生产订单创建请求/结果 + 级联结果
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 生产订单创建请求（交给外部生产订单原语）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrderRequest {
    pub product_id: String,
    pub facility_id: Option<String>,
    pub quantity: f64,
    pub start_date: NaiveDateTime,
    pub routing_id: Option<String>,
    pub order_name: Option<String>,
    pub description: Option<String>,
}

/// 已创建的生产订单引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrderRef {
    pub order_id: String,
    pub estimated_completion: NaiveDateTime,
}

/// 来源销售订单行（用于履约关联）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOrderLine {
    pub order_id: String,
    pub line_id: String,
}

impl SourceOrderLine {
    pub fn new(order_id: impl Into<String>, line_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            line_id: line_id.into(),
        }
    }
}

/// 单节点级联结果
///
/// 节点不需要制造时两个字段都为 None（不是错误）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingOrderOutcome {
    pub order_id: Option<String>,
    pub estimated_completion: Option<NaiveDateTime>,
}

impl ManufacturingOrderOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn created(order: ProductionOrderRef) -> Self {
        Self {
            order_id: Some(order.order_id),
            estimated_completion: Some(order.estimated_completion),
        }
    }
}
