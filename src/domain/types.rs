// ==========================================
// BOM 引擎 - 领域类型定义
// ==========================================
// 职责: 遍历模式、产品类型、规则运算符等枚举
// ==========================================

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// BOM 类型常量
// ==========================================
pub mod bom_types {
    /// 制造 BOM（默认）
    pub const MANUF_COMPONENT: &str = "MANUF_COMPONENT";
    /// 工程 BOM
    pub const ENGINEERING_COMPONENT: &str = "ENGINEERING_COMPONENT";
}

// ==========================================
// 遍历模式 (Traversal Mode)
// ==========================================
// 显式参数逐层传递，不使用全局模式标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraversalMode {
    Explosion,              // 多级展开
    ExplosionSingleLevel,   // 单级展开
    ExplosionManufacturing, // 制造展开（库存管理件不再下钻）
    Implosion,              // 反查（父项方向）
}

impl TraversalMode {
    /// 是否为向下展开
    pub fn is_explosion(&self) -> bool {
        !matches!(self, TraversalMode::Implosion)
    }
}

impl fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalMode::Explosion => write!(f, "EXPLOSION"),
            TraversalMode::ExplosionSingleLevel => write!(f, "EXPLOSION_SINGLE_LEVEL"),
            TraversalMode::ExplosionManufacturing => write!(f, "EXPLOSION_MANUFACTURING"),
            TraversalMode::Implosion => write!(f, "IMPLOSION"),
        }
    }
}

// ==========================================
// 产品类型 (Product Type)
// ==========================================
// 引擎只关心 WIP，其余类型原样透传
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Good,         // 普通商品
    FinishedGood, // 成品
    RawMaterial,  // 原材料
    Subassembly,  // 半成品/部件
    Wip,          // 在制品（无独立库存）
}

impl ProductType {
    /// 从数据库字符串解析（未知类型按 GOOD 处理）
    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "FINISHED_GOOD" => ProductType::FinishedGood,
            "RAW_MATERIAL" => ProductType::RawMaterial,
            "SUBASSEMBLY" => ProductType::Subassembly,
            "WIP" => ProductType::Wip,
            _ => ProductType::Good,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductType::Good => "GOOD",
            ProductType::FinishedGood => "FINISHED_GOOD",
            ProductType::RawMaterial => "RAW_MATERIAL",
            ProductType::Subassembly => "SUBASSEMBLY",
            ProductType::Wip => "WIP",
        }
    }
}

impl Default for ProductType {
    fn default() -> Self {
        ProductType::Good
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 规则组合运算符 (Rule Operator)
// ==========================================
// 只有 OR 会触发；AND 在数据中存在但不生效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOperator {
    Or,
    And,
}

impl RuleOperator {
    /// 从数据库字符串解析，无法识别返回 None
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OR" => Some(RuleOperator::Or),
            "AND" => Some(RuleOperator::And),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RuleOperator::Or => "OR",
            RuleOperator::And => "AND",
        }
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 有效期判断
// ==========================================

/// 判断 as_of 是否落在 [from, thru) 有效期内（thru 为空表示长期有效）
pub fn is_date_valid(
    from_date: Option<NaiveDateTime>,
    thru_date: Option<NaiveDateTime>,
    as_of: NaiveDateTime,
) -> bool {
    let started = from_date.map(|from| from <= as_of).unwrap_or(true);
    let not_expired = thru_date.map(|thru| thru > as_of).unwrap_or(true);
    started && not_expired
}

/// 小数天数换算为时长（精确到秒，非有限值按 0 处理）
pub fn days_to_duration(days: f64) -> Duration {
    if !days.is_finite() {
        return Duration::zero();
    }
    Duration::seconds((days * 86_400.0).round() as i64)
}
