// ==========================================
// BOM 引擎 - BOM 边领域模型
// ==========================================
// 职责: 父子装配关系（持久化关联记录）
// 说明: quantity / scrap_factor 为原始值，解析与容错在引擎层完成
// ==========================================

use crate::domain::types::is_date_valid;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// BomEdge - BOM 边
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomEdge {
    // ===== 关系 =====
    pub parent_product_id: String,
    pub child_product_id: String,
    pub bom_type: String,

    // ===== 用量 =====
    pub quantity: Option<f64>,     // 单位用量（无法解析时为 None）
    pub scrap_factor: Option<f64>, // 损耗率，带符号百分比（-10 表示回收 10%）

    // ===== 顺序/工艺 =====
    pub sequence_num: i64,
    pub routing_id: Option<String>, // 仅对该工艺路线生效

    // ===== 有效期 =====
    pub from_date: Option<NaiveDateTime>,
    pub thru_date: Option<NaiveDateTime>,

    // ===== 自定义用量计算 =====
    pub estimate_calc_method: Option<String>,
}

impl BomEdge {
    pub fn new(
        parent_product_id: impl Into<String>,
        child_product_id: impl Into<String>,
        bom_type: impl Into<String>,
        quantity: f64,
    ) -> Self {
        Self {
            parent_product_id: parent_product_id.into(),
            child_product_id: child_product_id.into(),
            bom_type: bom_type.into(),
            quantity: Some(quantity),
            scrap_factor: None,
            sequence_num: 0,
            routing_id: None,
            from_date: None,
            thru_date: None,
            estimate_calc_method: None,
        }
    }

    pub fn with_scrap(mut self, scrap_pct: f64) -> Self {
        self.scrap_factor = Some(scrap_pct);
        self
    }

    pub fn with_sequence(mut self, sequence_num: i64) -> Self {
        self.sequence_num = sequence_num;
        self
    }

    pub fn with_routing(mut self, routing_id: impl Into<String>) -> Self {
        self.routing_id = Some(routing_id.into());
        self
    }

    pub fn with_validity(
        mut self,
        from_date: Option<NaiveDateTime>,
        thru_date: Option<NaiveDateTime>,
    ) -> Self {
        self.from_date = from_date;
        self.thru_date = thru_date;
        self
    }

    pub fn with_calc_method(mut self, method: impl Into<String>) -> Self {
        self.estimate_calc_method = Some(method.into());
        self
    }

    /// 在 as_of 时点是否有效
    pub fn is_valid_at(&self, as_of: NaiveDateTime) -> bool {
        is_date_valid(self.from_date, self.thru_date, as_of)
    }

    /// 是否匹配给定工艺路线（None 只匹配通用 BOM）
    pub fn matches_routing(&self, routing_id: Option<&str>) -> bool {
        self.routing_id.as_deref() == routing_id
    }
}
