// ==========================================
// BOM 引擎 - 配置器
// ==========================================
// 职责: 将虚拟（模板）子件解析为具体替换件
// 规则: 四个解析策略按固定优先级依次尝试，首个产生替换的策略胜出
//       1) 上下文规则 2) 通用连接规则 3) 通用节点规则 4) 特征直选变体
// 红线: 同层多条可命中规则取列表中第一条；AND 规则不生效
// ==========================================

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::{ManufacturingRule, Product, RuleOperator, RuleScope, SelectedFeature};
use crate::engine::error::{BomError, BomResult};
use crate::engine::gateway::CatalogGateway;

// ==========================================
// 解析策略
// ==========================================

/// 配置器解析策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStrategy {
    ContextRules,
    LinkRules,
    NodeRules,
    FeatureVariant,
}

impl ResolutionStrategy {
    /// 固定优先级
    pub const PRECEDENCE: [ResolutionStrategy; 4] = [
        ResolutionStrategy::ContextRules,
        ResolutionStrategy::LinkRules,
        ResolutionStrategy::NodeRules,
        ResolutionStrategy::FeatureVariant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::ContextRules => "CONTEXT_RULES",
            ResolutionStrategy::LinkRules => "LINK_RULES",
            ResolutionStrategy::NodeRules => "NODE_RULES",
            ResolutionStrategy::FeatureVariant => "FEATURE_VARIANT",
        }
    }
}

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// 非虚拟件，或没有任何策略命中
    Unchanged,
    /// 规则命中且替换件为空：子件被移除
    Removed {
        rule: ManufacturingRule,
        strategy: ResolutionStrategy,
    },
    /// 替换为具体产品
    Substituted {
        product: Product,
        rule: Option<ManufacturingRule>,
        quantity_multiplier: f64,
        strategy: ResolutionStrategy,
    },
}

/// 父节点侧的上下文
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// 顶层被配置产品（原始请求产品）
    pub product_for_rules: &'a str,
    pub parent_product_id: &'a str,
    /// 父节点本身是替换件时，被替换前的产品
    pub parent_substituted_product_id: Option<&'a str>,
    pub selected_features: &'a [SelectedFeature],
    pub as_of: NaiveDateTime,
}

/// 待解析子件
#[derive(Debug, Clone, Copy)]
pub struct ChildCandidate<'a> {
    pub product: &'a Product,
    pub quantity_multiplier: f64,
}

// ==========================================
// Configurator
// ==========================================
pub struct Configurator<'a> {
    catalog: &'a dyn CatalogGateway,
}

impl<'a> Configurator<'a> {
    pub fn new(catalog: &'a dyn CatalogGateway) -> Self {
        Self { catalog }
    }

    /// 解析单个子件
    pub fn resolve(
        &self,
        ctx: &RuleContext<'_>,
        child: &ChildCandidate<'_>,
    ) -> BomResult<Resolution> {
        if !child.product.is_virtual {
            return Ok(Resolution::Unchanged);
        }

        for strategy in ResolutionStrategy::PRECEDENCE {
            if let Some(resolution) = self.apply_strategy(strategy, ctx, child)? {
                debug!(
                    parent_product_id = %ctx.parent_product_id,
                    child_product_id = %child.product.product_id,
                    strategy = strategy.as_str(),
                    "虚拟子件已解析"
                );
                return Ok(resolution);
            }
        }

        debug!(
            parent_product_id = %ctx.parent_product_id,
            child_product_id = %child.product.product_id,
            "虚拟子件未被任何策略解析"
        );
        Ok(Resolution::Unchanged)
    }

    fn apply_strategy(
        &self,
        strategy: ResolutionStrategy,
        ctx: &RuleContext<'_>,
        child: &ChildCandidate<'_>,
    ) -> BomResult<Option<Resolution>> {
        let in_product_id = child.product.product_id.as_str();

        let rules = match strategy {
            ResolutionStrategy::ContextRules => self.collect_parent_scoped(ctx, |for_id| {
                RuleScope::Context {
                    context_product_id: ctx.product_for_rules.to_string(),
                    for_product_id: for_id.to_string(),
                    in_product_id: in_product_id.to_string(),
                }
            })?,
            ResolutionStrategy::LinkRules => self.collect_parent_scoped(ctx, |for_id| {
                RuleScope::Link {
                    for_product_id: for_id.to_string(),
                    in_product_id: in_product_id.to_string(),
                }
            })?,
            ResolutionStrategy::NodeRules => {
                let scope = RuleScope::Node {
                    in_product_id: in_product_id.to_string(),
                };
                let mut rules = self.catalog.find_manufacturing_rules(&scope, ctx.as_of)?;
                rules.sort_by_key(|r| r.rule_seq);
                rules
            }
            ResolutionStrategy::FeatureVariant => {
                return self.resolve_by_features(ctx, child);
            }
        };

        self.apply_rules(strategy, &rules, ctx, child)
    }

    /// 收集父产品（及被替换前父产品）范围内的规则，保持列表顺序
    fn collect_parent_scoped<F>(
        &self,
        ctx: &RuleContext<'_>,
        scope_for: F,
    ) -> BomResult<Vec<ManufacturingRule>>
    where
        F: Fn(&str) -> RuleScope,
    {
        let mut rules = self
            .catalog
            .find_manufacturing_rules(&scope_for(ctx.parent_product_id), ctx.as_of)?;

        if let Some(substituted) = ctx
            .parent_substituted_product_id
            .filter(|s| *s != ctx.parent_product_id)
        {
            rules.extend(
                self.catalog
                    .find_manufacturing_rules(&scope_for(substituted), ctx.as_of)?,
            );
        }
        Ok(rules)
    }

    /// 依次评估规则，第一条命中的规则生效
    fn apply_rules(
        &self,
        strategy: ResolutionStrategy,
        rules: &[ManufacturingRule],
        ctx: &RuleContext<'_>,
        child: &ChildCandidate<'_>,
    ) -> BomResult<Option<Resolution>> {
        for rule in rules {
            if !rule_condition_satisfied(rule, ctx.selected_features) {
                continue;
            }

            match rule.operator {
                Some(RuleOperator::Or) => {}
                Some(RuleOperator::And) | None => {
                    debug!(rule_id = %rule.rule_id, operator = ?rule.operator, "非 OR 规则不生效，跳过");
                    continue;
                }
            }

            if rule.removes_child() {
                return Ok(Some(Resolution::Removed {
                    rule: rule.clone(),
                    strategy,
                }));
            }

            // removes_child() 为 false 时替换件必然非空
            let substitute_id = rule.substitute_product_id.as_deref().unwrap_or_default();
            let product = self.catalog.find_product(substitute_id)?.ok_or_else(|| {
                BomError::ProductNotFound {
                    product_id: substitute_id.to_string(),
                }
            })?;

            let quantity_multiplier = match rule.quantity {
                Some(qty) if qty > 0.0 => qty,
                _ => child.quantity_multiplier,
            };

            return Ok(Some(Resolution::Substituted {
                product,
                rule: Some(rule.clone()),
                quantity_multiplier,
                strategy,
            }));
        }
        Ok(None)
    }

    /// 特征直选：按 feature_type → feature_id 查找唯一变体
    fn resolve_by_features(
        &self,
        ctx: &RuleContext<'_>,
        child: &ChildCandidate<'_>,
    ) -> BomResult<Option<Resolution>> {
        if ctx.selected_features.is_empty() {
            return Ok(None);
        }

        let mut variants = self
            .catalog
            .resolve_variant(&child.product.product_id, ctx.selected_features)?;

        if variants.len() != 1 {
            debug!(
                virtual_product_id = %child.product.product_id,
                matches = variants.len(),
                "特征直选未得到唯一变体"
            );
            return Ok(None);
        }

        Ok(variants.pop().map(|product| Resolution::Substituted {
            product,
            rule: None,
            quantity_multiplier: child.quantity_multiplier,
            strategy: ResolutionStrategy::FeatureVariant,
        }))
    }
}

/// 规则条件：为空即满足，否则需命中某个已选特征 ID
pub fn rule_condition_satisfied(rule: &ManufacturingRule, features: &[SelectedFeature]) -> bool {
    if rule.is_unconditional() {
        return true;
    }
    let condition = rule.feature_condition.as_deref().unwrap_or_default();
    features.iter().any(|f| f.feature_id == condition)
}
