// ==========================================
// BOM 引擎 - 数量传递与汇总
// ==========================================
// 数量律: 子件数量 = 父件数量 × 用量乘数 × 损耗系数
// 例外: 到达边声明了自定义计算方法时，由外部计算器结果覆盖公式
//       （仅展开模式；计算器缺失或无返回值时告警并沿用公式）
// ==========================================

use std::collections::HashMap;
use tracing::{debug, warn};

use super::core::BomTree;
use crate::engine::bom_node::NodeId;
use crate::engine::error::{BomError, BomResult};
use crate::engine::gateway::{CustomCalcInput, CustomQuantityCalculator};

impl BomTree {
    /// 先序展平并计算各节点数量与层级
    ///
    /// - 根节点数量 = 树的根数量，层级 = `initial_depth`
    /// - `exclude_wip` 为真时，WIP 子件及其整棵子树被剪除
    pub fn flatten(
        &mut self,
        initial_depth: usize,
        exclude_wip: bool,
        calculator: Option<&dyn CustomQuantityCalculator>,
    ) -> BomResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, self.root_quantity, initial_depth)];

        while let Some((id, parent_quantity, depth)) = stack.pop() {
            let quantity = self.node_quantity(id, parent_quantity, calculator)?;
            {
                let node = &mut self.nodes[id.0];
                node.quantity = quantity;
                node.depth = depth;
            }
            out.push(id);

            let children: Vec<NodeId> = self
                .node(id)
                .resolved_children()
                .filter(|c| !(exclude_wip && self.node(*c).product().is_wip()))
                .collect();
            for child in children.into_iter().rev() {
                stack.push((child, quantity, depth + 1));
            }
        }

        debug!(
            root_product_id = %self.root_node().product_id(),
            node_count = out.len(),
            exclude_wip,
            "BOM 树展平完成"
        );
        Ok(out)
    }

    fn node_quantity(
        &self,
        id: NodeId,
        parent_quantity: f64,
        calculator: Option<&dyn CustomQuantityCalculator>,
    ) -> BomResult<f64> {
        let node = self.node(id);
        let formula = parent_quantity * node.quantity_multiplier() * node.scrap_factor();

        let method = match node.custom_calc_method() {
            Some(method) if self.mode.is_explosion() => method,
            _ => return Ok(formula),
        };

        let Some(calculator) = calculator else {
            warn!(
                product_id = %node.product_id(),
                method = %method,
                "未配置自定义用量计算器，沿用公式计算"
            );
            return Ok(formula);
        };

        let product = node.product();
        let input = CustomCalcInput {
            product_id: product.product_id.clone(),
            needed_quantity: parent_quantity * node.quantity_multiplier(),
            amount: self.root_amount,
            width: product.width.unwrap_or(0.0),
            height: product.height.unwrap_or(0.0),
            depth: product.depth.unwrap_or(0.0),
        };

        match calculator.calculate(method, &input) {
            Ok(Some(quantity)) => Ok(quantity),
            Ok(None) => {
                warn!(
                    product_id = %node.product_id(),
                    method = %method,
                    "自定义用量计算无返回值，沿用公式计算"
                );
                Ok(formula)
            }
            Err(e) => Err(BomError::CustomCalculation {
                method: method.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 按产品汇总数量（使用最近一次 `flatten` 的结果，含根节点）
    pub fn sum_quantities(&self) -> HashMap<String, f64> {
        self.sum_quantities_over(&self.preorder())
    }

    /// 只汇总给定节点（通常是 `flatten` 的返回值）
    pub fn sum_quantities_over(&self, ids: &[NodeId]) -> HashMap<String, f64> {
        let mut totals: HashMap<String, f64> = HashMap::new();
        for id in ids {
            let node = self.node(*id);
            *totals.entry(node.product_id().to_string()).or_insert(0.0) += node.quantity();
        }
        totals
    }
}
