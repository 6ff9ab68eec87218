// ==========================================
// BOM 引擎 - BOM 树构建与访问
// ==========================================
// 构建步骤:
// 1) "按另一产品制造" 重定向
// 2) 无 BOM 的变体回退到其虚拟产品（再做一次重定向）
// 3) 根节点的被替换节点指向原始请求产品（来源追溯）
// 4) 按遍历模式向下展开或向上反查
// 红线: 构建中任何数据访问失败都中止，不返回半棵树
// ==========================================

use chrono::{NaiveDateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

use super::loader::{LoadContext, TreeLoader};
use crate::config::BomEngineConfig;
use crate::domain::{SelectedFeature, TraversalMode};
use crate::engine::bom_node::{BomNode, NodeId};
use crate::engine::error::{BomError, BomResult};
use crate::engine::gateway::CatalogGateway;

// ==========================================
// BomTreeRequest - 构建请求
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct BomTreeRequest {
    pub product_id: String,
    pub bom_type: String,
    pub as_of: Option<NaiveDateTime>, // 为空取当前时间
    pub mode: TraversalMode,
    pub routing_id: Option<String>,
    /// 显式指定已选特征；为空时读取根产品上的标准特征
    pub selected_features: Option<Vec<SelectedFeature>>,
}

impl BomTreeRequest {
    pub fn new(
        product_id: impl Into<String>,
        bom_type: impl Into<String>,
        mode: TraversalMode,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            bom_type: bom_type.into(),
            as_of: None,
            mode,
            routing_id: None,
            selected_features: None,
        }
    }

    pub fn with_as_of(mut self, as_of: NaiveDateTime) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_routing(mut self, routing_id: impl Into<String>) -> Self {
        self.routing_id = Some(routing_id.into());
        self
    }

    pub fn with_features(mut self, features: Vec<SelectedFeature>) -> Self {
        self.selected_features = Some(features);
        self
    }
}

// ==========================================
// BomTree
// ==========================================
#[derive(Debug, Clone)]
pub struct BomTree {
    pub(crate) nodes: Vec<BomNode>,
    pub(crate) root: NodeId,
    pub(crate) root_quantity: f64,
    pub(crate) root_amount: f64,
    pub(crate) as_of: NaiveDateTime,
    pub(crate) bom_type: String,
    pub(crate) mode: TraversalMode,
    pub(crate) routing_id: Option<String>,
    pub(crate) requested_product_id: String,
    pub(crate) manufactured_product_id: String,
    pub(crate) selected_features: Vec<SelectedFeature>,
}

impl BomTree {
    /// 构建 BOM 树
    #[instrument(skip(request, catalog, config), fields(
        product_id = %request.product_id,
        bom_type = %request.bom_type,
        mode = %request.mode
    ))]
    pub fn build(
        request: BomTreeRequest,
        catalog: &dyn CatalogGateway,
        config: &BomEngineConfig,
    ) -> BomResult<Self> {
        let BomTreeRequest {
            product_id,
            bom_type,
            as_of,
            mode,
            routing_id,
            selected_features,
        } = request;
        let as_of = as_of.unwrap_or_else(|| Utc::now().naive_utc());

        let requested = catalog
            .find_product(&product_id)?
            .ok_or_else(|| BomError::ProductNotFound {
                product_id: product_id.clone(),
            })?;

        let manufactured_product_id = resolve_manufactured_product(
            catalog,
            &requested.product_id,
            &bom_type,
            routing_id.as_deref(),
            as_of,
        )?;

        let manufactured = if manufactured_product_id == requested.product_id {
            requested.clone()
        } else {
            catalog
                .find_product(&manufactured_product_id)?
                .ok_or_else(|| BomError::ProductNotFound {
                    product_id: manufactured_product_id.clone(),
                })?
        };

        let selected_features = match selected_features {
            Some(features) => features,
            None => catalog.find_selected_features(&requested.product_id, as_of)?,
        };

        // 节点表: [0] 原始请求产品（游离，仅供追溯），[1] 根节点
        // 只有发生重定向时根节点才指向 [0]
        let redirected = manufactured_product_id != requested.product_id;
        let mut nodes = vec![BomNode::new(requested)];
        let mut root_node = BomNode::new(manufactured);
        if redirected {
            root_node.substituted = Some(NodeId(0));
        }
        root_node.bom_type = Some(bom_type.clone());
        nodes.push(root_node);
        let root = NodeId(1);

        {
            let ctx = LoadContext {
                catalog,
                bom_type: &bom_type,
                routing_id: routing_id.as_deref(),
                as_of,
                mode,
                selected_features: &selected_features,
                product_for_rules: &product_id,
                max_depth: config.max_depth,
            };
            let mut loader = TreeLoader::new(ctx, &mut nodes);
            match mode {
                TraversalMode::Implosion => loader.load_parents(root, 0)?,
                _ => loader.load_children(root, 0)?,
            }
        }

        let tree = BomTree {
            nodes,
            root,
            root_quantity: 1.0,
            root_amount: 0.0,
            as_of,
            bom_type,
            mode,
            routing_id,
            requested_product_id: product_id,
            manufactured_product_id,
            selected_features,
        };

        info!(
            requested_product_id = %tree.requested_product_id,
            manufactured_product_id = %tree.manufactured_product_id,
            node_count = tree.preorder().len(),
            "BOM 树构建完成"
        );
        Ok(tree)
    }

    // ==========================================
    // 访问器
    // ==========================================

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &BomNode {
        self.node(self.root)
    }

    /// 按 ID 取节点（NodeId 只由本树产生，下标必然有效）
    pub fn node(&self, id: NodeId) -> &BomNode {
        &self.nodes[id.0]
    }

    /// 已解析子节点
    pub fn children(&self, id: NodeId) -> Vec<&BomNode> {
        self.node(id)
            .resolved_children()
            .map(|c| self.node(c))
            .collect()
    }

    pub fn root_quantity(&self) -> f64 {
        self.root_quantity
    }

    pub fn set_root_quantity(&mut self, quantity: f64) {
        self.root_quantity = quantity;
    }

    pub fn root_amount(&self) -> f64 {
        self.root_amount
    }

    pub fn set_root_amount(&mut self, amount: f64) {
        self.root_amount = amount;
    }

    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    pub fn bom_type(&self) -> &str {
        &self.bom_type
    }

    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    pub fn routing_id(&self) -> Option<&str> {
        self.routing_id.as_deref()
    }

    pub fn requested_product_id(&self) -> &str {
        &self.requested_product_id
    }

    pub fn manufactured_product_id(&self) -> &str {
        &self.manufactured_product_id
    }

    pub fn selected_features(&self) -> &[SelectedFeature] {
        &self.selected_features
    }

    // ==========================================
    // 结构查询
    // ==========================================

    /// 先序遍历已解析节点（不含游离的被替换节点）
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children: Vec<NodeId> = self.node(id).resolved_children().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// 树中出现的产品（先序去重）
    pub fn all_product_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.preorder()
            .into_iter()
            .map(|id| self.node(id).product_id().to_string())
            .filter(|pid| seen.insert(pid.clone()))
            .collect()
    }

    /// 结构最大深度（根为 0）
    pub fn max_depth(&self) -> usize {
        fn walk(tree: &BomTree, id: NodeId, depth: usize) -> usize {
            tree.node(id)
                .resolved_children()
                .map(|c| walk(tree, c, depth + 1))
                .max()
                .unwrap_or(depth)
        }
        walk(self, self.root, 0)
    }

    /// 仍为虚拟产品的节点（不含根）
    ///
    /// 命中虚拟节点后不再向下查找
    pub fn unconfigured_nodes(&self) -> Vec<NodeId> {
        fn walk(tree: &BomTree, id: NodeId, out: &mut Vec<NodeId>) {
            for child in tree.node(id).resolved_children() {
                if tree.node(child).is_virtual() {
                    out.push(child);
                } else {
                    walk(tree, child, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, self.root, &mut out);
        out
    }

    /// 配置是否完整：规则解析后不存在虚拟子件
    pub fn is_configured(&self) -> bool {
        let unconfigured = self.unconfigured_nodes();
        if !unconfigured.is_empty() {
            debug!(
                unconfigured_count = unconfigured.len(),
                "BOM 树存在未配置的虚拟子件"
            );
        }
        unconfigured.is_empty()
    }
}

/// 解析实际制造产品
fn resolve_manufactured_product(
    catalog: &dyn CatalogGateway,
    product_id: &str,
    bom_type: &str,
    routing_id: Option<&str>,
    as_of: NaiveDateTime,
) -> BomResult<String> {
    let mut resolved = catalog
        .find_manufactured_as(product_id, as_of)?
        .unwrap_or_else(|| product_id.to_string());

    if !has_bom(catalog, &resolved, bom_type, routing_id, as_of)? {
        if let Some(virtual_id) = catalog.find_virtual_parent(&resolved, as_of)? {
            debug!(
                variant_product_id = %resolved,
                virtual_product_id = %virtual_id,
                "变体无 BOM，回退到虚拟产品"
            );
            resolved = catalog
                .find_manufactured_as(&virtual_id, as_of)?
                .unwrap_or(virtual_id);
        }
    }

    if resolved != product_id {
        debug!(
            requested_product_id = %product_id,
            manufactured_product_id = %resolved,
            "根产品已重定向"
        );
    }
    Ok(resolved)
}

/// 产品在指定（或通用）工艺路线下是否有 BOM
fn has_bom(
    catalog: &dyn CatalogGateway,
    product_id: &str,
    bom_type: &str,
    routing_id: Option<&str>,
    as_of: NaiveDateTime,
) -> BomResult<bool> {
    if routing_id.is_some()
        && !catalog
            .find_bom_edges(product_id, bom_type, routing_id, as_of)?
            .is_empty()
    {
        return Ok(true);
    }
    Ok(!catalog
        .find_bom_edges(product_id, bom_type, None, as_of)?
        .is_empty())
}
