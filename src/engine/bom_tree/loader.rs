// ==========================================
// BOM 引擎 - 子件/父项加载
// ==========================================
// 边查找三级回退（首个非空结果即停止）:
// 1) 本节点产品 + 指定工艺路线
// 2) 本节点为替换件时，被替换的虚拟产品 + 指定工艺路线
// 3) 指定了工艺路线且上面均为空时，清空工艺路线重复 1)、2)
// 递归策略: EXPLOSION 全部下钻；EXPLOSION_MANUFACTURING 只下钻非库存管理件；
//           EXPLOSION_SINGLE_LEVEL 不下钻；IMPLOSION 向上反查
// ==========================================

use chrono::NaiveDateTime;
use tracing::debug;

use super::manufacturing::warehouse_managed;
use crate::domain::{BomEdge, SelectedFeature, TraversalMode};
use crate::engine::bom_node::{BomNode, NodeId};
use crate::engine::configurator::{ChildCandidate, Configurator, Resolution, RuleContext};
use crate::engine::error::{BomError, BomResult};
use crate::engine::gateway::CatalogGateway;
use crate::engine::scrap::{quantity_multiplier, scrap_multiplier};

/// 边查找方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeDirection {
    Children,
    Parents,
}

/// 单次构建共享的只读上下文
pub(super) struct LoadContext<'a> {
    pub catalog: &'a dyn CatalogGateway,
    pub bom_type: &'a str,
    pub routing_id: Option<&'a str>,
    pub as_of: NaiveDateTime,
    pub mode: TraversalMode,
    pub selected_features: &'a [SelectedFeature],
    pub product_for_rules: &'a str,
    pub max_depth: usize,
}

pub(super) struct TreeLoader<'a> {
    ctx: LoadContext<'a>,
    nodes: &'a mut Vec<BomNode>,
}

impl<'a> TreeLoader<'a> {
    pub fn new(ctx: LoadContext<'a>, nodes: &'a mut Vec<BomNode>) -> Self {
        Self { ctx, nodes }
    }

    fn push(&mut self, node: BomNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn product_id_of(&self, id: NodeId) -> String {
        self.nodes[id.0].product.product_id.clone()
    }

    // ==========================================
    // 向下展开
    // ==========================================

    pub fn load_children(&mut self, id: NodeId, depth: usize) -> BomResult<()> {
        self.guard(id, depth)?;

        let product_id = self.product_id_of(id);
        let substituted_product_id = self.nodes[id.0].substituted.map(|s| self.product_id_of(s));

        let edges = self.lookup_edges(
            EdgeDirection::Children,
            &product_id,
            substituted_product_id.as_deref(),
        )?;

        {
            let node = &mut self.nodes[id.0];
            node.bom_type = Some(self.ctx.bom_type.to_string());
            node.child_edges = edges.clone();
        }

        let mut slots = Vec::with_capacity(edges.len());
        for edge in &edges {
            let slot = self.attach_child(
                id,
                edge,
                &product_id,
                substituted_product_id.as_deref(),
            )?;

            if let Some(child) = slot {
                match self.ctx.mode {
                    TraversalMode::Explosion => self.load_children(child, depth + 1)?,
                    TraversalMode::ExplosionManufacturing => {
                        // 库存管理件按采购/领料处理，不再下钻
                        if !warehouse_managed(&self.nodes[..], child, self.ctx.catalog, None)? {
                            self.load_children(child, depth + 1)?;
                        }
                    }
                    TraversalMode::ExplosionSingleLevel | TraversalMode::Implosion => {}
                }
            }
            slots.push(slot);
        }
        self.nodes[id.0].children = slots;
        Ok(())
    }

    /// 为一条子边建立节点，必要时经配置器替换；被移除时返回 None
    fn attach_child(
        &mut self,
        parent: NodeId,
        edge: &BomEdge,
        parent_product_id: &str,
        parent_substituted_product_id: Option<&str>,
    ) -> BomResult<Option<NodeId>> {
        let product = self
            .ctx
            .catalog
            .find_product(&edge.child_product_id)?
            .ok_or_else(|| BomError::ProductNotFound {
                product_id: edge.child_product_id.clone(),
            })?;

        let mut child = BomNode::new(product);
        child.parent = Some(parent);
        child.edge = Some(edge.clone());
        child.quantity_multiplier = quantity_multiplier(edge);
        child.scrap_factor = scrap_multiplier(edge.scrap_factor);

        if !child.product.is_virtual {
            return Ok(Some(self.push(child)));
        }

        let resolution = {
            let rule_ctx = RuleContext {
                product_for_rules: self.ctx.product_for_rules,
                parent_product_id,
                parent_substituted_product_id,
                selected_features: self.ctx.selected_features,
                as_of: self.ctx.as_of,
            };
            let candidate = ChildCandidate {
                product: &child.product,
                quantity_multiplier: child.quantity_multiplier,
            };
            Configurator::new(self.ctx.catalog).resolve(&rule_ctx, &candidate)?
        };

        match resolution {
            Resolution::Unchanged => Ok(Some(self.push(child))),
            Resolution::Removed { rule, strategy } => {
                debug!(
                    parent_product_id = %parent_product_id,
                    child_product_id = %edge.child_product_id,
                    rule_id = %rule.rule_id,
                    strategy = strategy.as_str(),
                    "子件被规则移除"
                );
                Ok(None)
            }
            Resolution::Substituted {
                product,
                rule,
                quantity_multiplier,
                ..
            } => {
                let scrap_factor = child.scrap_factor;
                let edge = child.edge.clone();
                let virtual_id = self.push(child);

                let mut substitute = BomNode::new(product);
                substitute.parent = Some(parent);
                substitute.substituted = Some(virtual_id);
                substitute.edge = edge;
                substitute.rule_applied = rule;
                substitute.quantity_multiplier = quantity_multiplier;
                substitute.scrap_factor = scrap_factor;
                Ok(Some(self.push(substitute)))
            }
        }
    }

    // ==========================================
    // 向上反查
    // ==========================================

    /// 反查父项，不经过配置器，用量乘数保持 1
    pub fn load_parents(&mut self, id: NodeId, depth: usize) -> BomResult<()> {
        self.guard(id, depth)?;

        let product_id = self.product_id_of(id);
        let substituted_product_id = self.nodes[id.0].substituted.map(|s| self.product_id_of(s));

        let edges = self.lookup_edges(
            EdgeDirection::Parents,
            &product_id,
            substituted_product_id.as_deref(),
        )?;

        {
            let node = &mut self.nodes[id.0];
            node.bom_type = Some(self.ctx.bom_type.to_string());
            node.child_edges = edges.clone();
        }

        let mut slots = Vec::with_capacity(edges.len());
        for edge in &edges {
            let product = self
                .ctx
                .catalog
                .find_product(&edge.parent_product_id)?
                .ok_or_else(|| BomError::ProductNotFound {
                    product_id: edge.parent_product_id.clone(),
                })?;

            let mut parent_node = BomNode::new(product);
            parent_node.parent = Some(id);
            parent_node.edge = Some(edge.clone());
            let parent_id = self.push(parent_node);

            self.load_parents(parent_id, depth + 1)?;
            slots.push(Some(parent_id));
        }
        self.nodes[id.0].children = slots;
        Ok(())
    }

    // ==========================================
    // 公共
    // ==========================================

    fn lookup_edges(
        &self,
        direction: EdgeDirection,
        product_id: &str,
        substituted_product_id: Option<&str>,
    ) -> BomResult<Vec<BomEdge>> {
        let mut routings = vec![self.ctx.routing_id];
        if self.ctx.routing_id.is_some() {
            routings.push(None);
        }

        for routing in routings {
            let mut candidates = vec![product_id];
            candidates.extend(substituted_product_id);

            for candidate in candidates {
                let mut edges = self.fetch_edges(direction, candidate, routing)?;
                if !edges.is_empty() {
                    if candidate != product_id || routing != self.ctx.routing_id {
                        debug!(
                            product_id = %product_id,
                            edges_from = %candidate,
                            routing_id = ?routing,
                            "BOM 边查找已回退"
                        );
                    }
                    edges.sort_by_key(|e| e.sequence_num);
                    return Ok(edges);
                }
            }
        }
        Ok(Vec::new())
    }

    fn fetch_edges(
        &self,
        direction: EdgeDirection,
        product_id: &str,
        routing_id: Option<&str>,
    ) -> BomResult<Vec<BomEdge>> {
        let edges = match direction {
            EdgeDirection::Children => self.ctx.catalog.find_bom_edges(
                product_id,
                self.ctx.bom_type,
                routing_id,
                self.ctx.as_of,
            )?,
            EdgeDirection::Parents => self.ctx.catalog.find_parent_edges(
                product_id,
                self.ctx.bom_type,
                routing_id,
                self.ctx.as_of,
            )?,
        };
        Ok(edges)
    }

    /// 层级上限 + 祖先链上的循环引用检查
    fn guard(&self, id: NodeId, depth: usize) -> BomResult<()> {
        let product_id = &self.nodes[id.0].product.product_id;

        if depth >= self.ctx.max_depth {
            return Err(BomError::MaxDepthExceeded {
                max_depth: self.ctx.max_depth,
                product_id: product_id.clone(),
            });
        }

        let mut cursor = self.nodes[id.0].parent;
        while let Some(ancestor) = cursor {
            if self.nodes[ancestor.0].product.product_id == *product_id {
                return Err(BomError::CycleDetected {
                    product_id: product_id.clone(),
                });
            }
            cursor = self.nodes[ancestor.0].parent;
        }
        Ok(())
    }
}
