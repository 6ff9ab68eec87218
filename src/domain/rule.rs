// ==========================================
// BOM 引擎 - 制造规则领域模型
// ==========================================
// 职责: 配置器替换规则 + 规则查询范围
// ==========================================

use crate::domain::types::{is_date_valid, RuleOperator};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ManufacturingRule - 制造规则
// ==========================================
// 语义: 在 context 产品下，for 产品的 in 子件，满足特征条件时替换为 substitute
//       substitute 为空表示移除该子件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingRule {
    pub rule_id: String,
    pub context_product_id: Option<String>,    // 被配置的顶层产品
    pub for_product_id: Option<String>,        // 父项
    pub in_product_id: String,                 // 被替换的（虚拟）子件
    pub substitute_product_id: Option<String>, // 替换件（空 = 移除）
    pub feature_condition: Option<String>,     // 特征条件（空 = 无条件）
    pub operator: Option<RuleOperator>,
    pub quantity: Option<f64>,                 // 用量覆写（>0 生效）
    pub rule_seq: i64,
    pub from_date: Option<NaiveDateTime>,
    pub thru_date: Option<NaiveDateTime>,
}

impl ManufacturingRule {
    /// 创建无条件 OR 规则
    pub fn new(rule_id: impl Into<String>, in_product_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            context_product_id: None,
            for_product_id: None,
            in_product_id: in_product_id.into(),
            substitute_product_id: None,
            feature_condition: None,
            operator: Some(RuleOperator::Or),
            quantity: None,
            rule_seq: 0,
            from_date: None,
            thru_date: None,
        }
    }

    pub fn with_context(mut self, context_product_id: impl Into<String>) -> Self {
        self.context_product_id = Some(context_product_id.into());
        self
    }

    pub fn with_for(mut self, for_product_id: impl Into<String>) -> Self {
        self.for_product_id = Some(for_product_id.into());
        self
    }

    pub fn substitute_with(mut self, product_id: impl Into<String>) -> Self {
        self.substitute_product_id = Some(product_id.into());
        self
    }

    pub fn when_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_condition = Some(feature_id.into());
        self
    }

    pub fn with_operator(mut self, operator: RuleOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_seq(mut self, rule_seq: i64) -> Self {
        self.rule_seq = rule_seq;
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

    pub fn is_valid_at(&self, as_of: NaiveDateTime) -> bool {
        is_date_valid(self.from_date, self.thru_date, as_of)
    }

    /// 是否无条件规则
    pub fn is_unconditional(&self) -> bool {
        self.feature_condition
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true)
    }

    /// 规则命中后是否移除子件
    pub fn removes_child(&self) -> bool {
        self.substitute_product_id
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    }
}

// ==========================================
// RuleScope - 规则查询范围
// ==========================================
// 对应配置器的三个规则层级
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// 上下文规则: context + for + in
    Context {
        context_product_id: String,
        for_product_id: String,
        in_product_id: String,
    },
    /// 通用连接规则: for + in，不带 context
    Link {
        for_product_id: String,
        in_product_id: String,
    },
    /// 通用节点规则: 仅 in（不带 context/for），按 rule_seq 排序
    Node { in_product_id: String },
}

impl RuleScope {
    /// 判断规则是否落在该范围内
    pub fn matches(&self, rule: &ManufacturingRule) -> bool {
        match self {
            RuleScope::Context {
                context_product_id,
                for_product_id,
                in_product_id,
            } => {
                rule.context_product_id.as_deref() == Some(context_product_id.as_str())
                    && rule.for_product_id.as_deref() == Some(for_product_id.as_str())
                    && rule.in_product_id == *in_product_id
            }
            RuleScope::Link {
                for_product_id,
                in_product_id,
            } => {
                rule.context_product_id.is_none()
                    && rule.for_product_id.as_deref() == Some(for_product_id.as_str())
                    && rule.in_product_id == *in_product_id
            }
            RuleScope::Node { in_product_id } => {
                rule.context_product_id.is_none()
                    && rule.for_product_id.is_none()
                    && rule.in_product_id == *in_product_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_flags() {
        let remove = ManufacturingRule::new("R1", "V");
        assert!(remove.removes_child());
        assert!(remove.is_unconditional());

        let subst = ManufacturingRule::new("R2", "V")
            .substitute_with("V-RED")
            .when_feature("RED");
        assert!(!subst.removes_child());
        assert!(!subst.is_unconditional());
    }

    #[test]
    fn test_scope_matching() {
        let rule = ManufacturingRule::new("R1", "V")
            .with_context("TOP")
            .with_for("P")
            .substitute_with("V1");

        let context = RuleScope::Context {
            context_product_id: "TOP".to_string(),
            for_product_id: "P".to_string(),
            in_product_id: "V".to_string(),
        };
        let link = RuleScope::Link {
            for_product_id: "P".to_string(),
            in_product_id: "V".to_string(),
        };
        let node = RuleScope::Node {
            in_product_id: "V".to_string(),
        };
        let other_context = RuleScope::Context {
            context_product_id: "OTHER".to_string(),
            for_product_id: "P".to_string(),
            in_product_id: "V".to_string(),
        };

        assert!(rule.is_valid_at(chrono::Utc::now().naive_utc()));
        assert!(context.matches(&rule));
        assert!(!other_context.matches(&rule));
        // 带 context 的规则只属于上下文层级
        assert!(!link.matches(&rule));
        assert!(!node.matches(&rule));

        let generic_link = ManufacturingRule::new("R2", "V").with_for("P");
        assert!(link.matches(&generic_link));
        assert!(!node.matches(&generic_link));

        let generic_node = ManufacturingRule::new("R3", "V");
        assert!(node.matches(&generic_node));
        assert!(!link.matches(&generic_node));
    }
}
