// ==========================================
// BOM 引擎 - 制造判定与倒排开工日期
// ==========================================
// 规则:
// - 自制件: 至少一个已解析子件，且（忽略供应商 或 当前无有效首选供应商记录）
// - 库存管理件: WIP 永远不是；否则本产品或被替换产品在设施上有库存策略（minimum_stock）
// - 开工日期: WIP 节点（或强制全部节点）按设施提前期从需求日期倒推，再向子件递归取最小值
//   非 WIP 且未强制的节点直接返回需求日期
// ==========================================

use chrono::{NaiveDateTime, Utc};
use tracing::debug;

use super::core::BomTree;
use crate::domain::days_to_duration;
use crate::engine::bom_node::{BomNode, NodeId};
use crate::engine::error::BomResult;
use crate::engine::gateway::CatalogGateway;

/// 节点是否由仓库管理（直接领料，不再展开制造）
pub(crate) fn warehouse_managed(
    nodes: &[BomNode],
    id: NodeId,
    catalog: &dyn CatalogGateway,
    facility_id: Option<&str>,
) -> BomResult<bool> {
    let node = &nodes[id.0];
    if node.product.is_wip() {
        return Ok(false);
    }

    if catalog.has_stocking_facility(&node.product.product_id, facility_id)? {
        return Ok(true);
    }

    match node.substituted {
        Some(substituted) => {
            let substituted_id = &nodes[substituted.0].product.product_id;
            Ok(catalog.has_stocking_facility(substituted_id, facility_id)?)
        }
        None => Ok(false),
    }
}

impl BomTree {
    pub fn is_warehouse_managed(
        &self,
        id: NodeId,
        catalog: &dyn CatalogGateway,
        facility_id: Option<&str>,
    ) -> BomResult<bool> {
        warehouse_managed(&self.nodes, id, catalog, facility_id)
    }

    /// 节点是否需要自制
    ///
    /// 供应商记录按当前时间判定，与树的有效日期无关
    pub fn is_manufactured(
        &self,
        id: NodeId,
        ignore_supplier_products: bool,
        catalog: &dyn CatalogGateway,
    ) -> BomResult<bool> {
        let node = self.node(id);
        if !node.has_resolved_children() {
            return Ok(false);
        }
        if ignore_supplier_products {
            return Ok(true);
        }
        let purchased =
            catalog.has_valid_supplier_record(node.product_id(), Utc::now().naive_utc())?;
        Ok(!purchased)
    }

    /// 倒排开工日期：返回子树内最早开工时间
    ///
    /// 只有 WIP（或 `all_nodes`）节点才倒排并继续向下递归
    pub fn start_date(
        &self,
        id: NodeId,
        catalog: &dyn CatalogGateway,
        facility_id: Option<&str>,
        required_by: NaiveDateTime,
        all_nodes: bool,
    ) -> BomResult<NaiveDateTime> {
        let node = self.node(id);
        let mut min_start = required_by;

        if node.product.is_wip() || all_nodes {
            let lead_days = catalog
                .facility_lead_time_days(node.product_id(), facility_id)?
                .unwrap_or(0.0);
            min_start = required_by - days_to_duration(lead_days);
            debug!(
                product_id = %node.product_id(),
                lead_days,
                start = %min_start,
                "倒排开工日期"
            );

            for child in node.resolved_children() {
                let child_start = self.start_date(child, catalog, facility_id, min_start, false)?;
                if child_start < min_start {
                    min_start = child_start;
                }
            }
        }
        Ok(min_start)
    }
}

