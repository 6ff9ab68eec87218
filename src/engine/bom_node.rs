// ==========================================
// BOM 引擎 - BOM 节点
// ==========================================
// 职责: 树中一次产品出现 + 已解析子节点 + 用量乘数 + 来源
// 说明: 节点由 BomTree 的节点表统一持有；父节点/被替换节点为 NodeId 反向引用，
//       不形成所有权环
// ==========================================

use serde::Serialize;

use crate::domain::{BomEdge, ManufacturingRule, Product};

/// 节点表下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

// ==========================================
// BomNode
// ==========================================
#[derive(Debug, Clone)]
pub struct BomNode {
    pub(crate) product: Product,
    pub(crate) parent: Option<NodeId>,
    pub(crate) substituted: Option<NodeId>, // 被本节点替换的虚拟节点
    pub(crate) edge: Option<BomEdge>,       // 到达本节点的边（根节点为 None）
    pub(crate) rule_applied: Option<ManufacturingRule>,

    // 子边与子节点槽位下标对齐；被规则移除的子件对应槽位为 None
    pub(crate) child_edges: Vec<BomEdge>,
    pub(crate) children: Vec<Option<NodeId>>,

    pub(crate) quantity_multiplier: f64,
    pub(crate) scrap_factor: f64,
    pub(crate) depth: usize,
    pub(crate) quantity: f64,
    pub(crate) bom_type: Option<String>,
}

impl BomNode {
    pub(crate) fn new(product: Product) -> Self {
        Self {
            product,
            parent: None,
            substituted: None,
            edge: None,
            rule_applied: None,
            child_edges: Vec::new(),
            children: Vec::new(),
            quantity_multiplier: 1.0,
            scrap_factor: 1.0,
            depth: 0,
            quantity: 0.0,
            bom_type: None,
        }
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn product_id(&self) -> &str {
        &self.product.product_id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn substituted(&self) -> Option<NodeId> {
        self.substituted
    }

    pub fn edge(&self) -> Option<&BomEdge> {
        self.edge.as_ref()
    }

    pub fn rule_applied(&self) -> Option<&ManufacturingRule> {
        self.rule_applied.as_ref()
    }

    pub fn child_edges(&self) -> &[BomEdge] {
        &self.child_edges
    }

    /// 子节点槽位（含被移除的空槽）
    pub fn child_slots(&self) -> &[Option<NodeId>] {
        &self.children
    }

    /// 已解析的子节点
    pub fn resolved_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().filter_map(|c| *c)
    }

    pub fn has_resolved_children(&self) -> bool {
        self.children.iter().any(|c| c.is_some())
    }

    pub fn quantity_multiplier(&self) -> f64 {
        self.quantity_multiplier
    }

    pub fn scrap_factor(&self) -> f64 {
        self.scrap_factor
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 最近一次数量传递计算出的需求数量
    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn bom_type(&self) -> Option<&str> {
        self.bom_type.as_deref()
    }

    pub fn is_virtual(&self) -> bool {
        self.product.is_virtual
    }

    /// 到达边上声明的自定义用量计算方法
    pub fn custom_calc_method(&self) -> Option<&str> {
        self.edge
            .as_ref()
            .and_then(|e| e.estimate_calc_method.as_deref())
            .filter(|m| !m.trim().is_empty())
    }
}
