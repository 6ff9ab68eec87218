// ==========================================
// BOM 引擎 - 制造订单级联
// ==========================================
// 流程: 入口先按根数量做一次数量传递，再后序遍历，子件先下单
// 1) 非自制节点不下单，返回空结果
// 2) 开工时间 = 子订单最晚完工时间（无子订单时取调用方日期）
// 3) 按节点传递数量创建本节点生产订单
// 4) 有来源销售订单行时建立履约关联
// 5) 每个子订单建立 子 -> 父 的前置关系
// 红线: 单节点下单失败只记录错误，不中断兄弟节点；已建订单不回滚
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::domain::{ManufacturingOrderOutcome, ProductionOrderRequest, SourceOrderLine};
use crate::engine::bom_node::NodeId;
use crate::engine::bom_tree::BomTree;
use crate::engine::error::BomResult;
use crate::engine::gateway::{CatalogGateway, CustomQuantityCalculator, ProductionOrderGateway};

// ==========================================
// ManufacturingOrderRequest - 级联请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingOrderRequest {
    pub facility_id: Option<String>,
    pub start_date: NaiveDateTime,
    pub order_name: Option<String>,
    pub description: Option<String>,
    pub routing_id: Option<String>,
    pub source_order: Option<SourceOrderLine>,
    pub shipment_id: Option<String>,
}

impl ManufacturingOrderRequest {
    pub fn new(start_date: NaiveDateTime) -> Self {
        Self {
            facility_id: None,
            start_date,
            order_name: None,
            description: None,
            routing_id: None,
            source_order: None,
            shipment_id: None,
        }
    }

    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.facility_id = Some(facility_id.into());
        self
    }

    pub fn with_name(mut self, order_name: impl Into<String>) -> Self {
        self.order_name = Some(order_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_routing(mut self, routing_id: impl Into<String>) -> Self {
        self.routing_id = Some(routing_id.into());
        self
    }

    pub fn with_source_order(mut self, source_order: SourceOrderLine) -> Self {
        self.source_order = Some(source_order);
        self
    }

    pub fn with_shipment(mut self, shipment_id: impl Into<String>) -> Self {
        self.shipment_id = Some(shipment_id.into());
        self
    }

    /// 子节点请求：只继承设施、日期、发运单
    fn for_child(&self) -> Self {
        Self {
            facility_id: self.facility_id.clone(),
            start_date: self.start_date,
            order_name: None,
            description: None,
            routing_id: None,
            source_order: None,
            shipment_id: self.shipment_id.clone(),
        }
    }
}

// ==========================================
// ManufacturingOrderCascade
// ==========================================
pub struct ManufacturingOrderCascade<'a> {
    catalog: &'a dyn CatalogGateway,
    orders: &'a dyn ProductionOrderGateway,
    calculator: Option<&'a dyn CustomQuantityCalculator>,
}

impl<'a> ManufacturingOrderCascade<'a> {
    pub fn new(catalog: &'a dyn CatalogGateway, orders: &'a dyn ProductionOrderGateway) -> Self {
        Self {
            catalog,
            orders,
            calculator: None,
        }
    }

    /// 数量传递时使用的自定义用量计算器
    pub fn with_calculator(mut self, calculator: Option<&'a dyn CustomQuantityCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    /// 从根节点发起级联
    ///
    /// 先按树的根数量重算全部节点数量，再下单；
    /// 根订单以原始请求产品下单，且不因供应商记录跳过
    #[instrument(skip(self, tree, request), fields(
        root_product_id = %tree.root_node().product_id(),
        start_date = %request.start_date
    ))]
    pub fn run(
        &self,
        tree: &mut BomTree,
        request: &ManufacturingOrderRequest,
    ) -> BomResult<ManufacturingOrderOutcome> {
        tree.flatten(0, false, self.calculator)?;
        let tree: &BomTree = tree;
        let outcome = self.create_manufacturing_order(tree, tree.root(), request, true, true)?;
        info!(
            order_id = ?outcome.order_id,
            estimated_completion = ?outcome.estimated_completion,
            "制造订单级联完成"
        );
        Ok(outcome)
    }

    /// 为单个节点（及其子树）创建制造订单
    ///
    /// 订单数量取节点当前数量（`run` 已完成数量传递）。
    /// 目录数据访问失败会中止级联；订单网关失败只记录错误
    pub fn create_manufacturing_order(
        &self,
        tree: &BomTree,
        id: NodeId,
        request: &ManufacturingOrderRequest,
        use_substitute: bool,
        ignore_supplier_products: bool,
    ) -> BomResult<ManufacturingOrderOutcome> {
        if !tree.is_manufactured(id, ignore_supplier_products, self.catalog)? {
            return Ok(ManufacturingOrderOutcome::none());
        }

        let node = tree.node(id);
        let child_request = request.for_child();

        let mut child_order_ids = Vec::new();
        let mut max_child_completion: Option<NaiveDateTime> = None;
        for child in node.resolved_children() {
            let outcome =
                self.create_manufacturing_order(tree, child, &child_request, false, false)?;
            if let Some(completion) = outcome.estimated_completion {
                if max_child_completion.map_or(true, |max| completion > max) {
                    max_child_completion = Some(completion);
                }
            }
            if let Some(order_id) = outcome.order_id {
                child_order_ids.push(order_id);
            }
        }

        let product = match (use_substitute, node.substituted()) {
            (true, Some(substituted)) => tree.node(substituted).product(),
            _ => node.product(),
        };

        let facility_id = request
            .facility_id
            .clone()
            .or_else(|| product.facility_id.clone());

        let order_name = match (&request.order_name, &request.shipment_id) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(shipment_id)) => Some(format!("SP_{}_{}", shipment_id, product.product_id)),
            (None, None) => None,
        };

        let start_date = max_child_completion.unwrap_or(request.start_date);

        let order_request = ProductionOrderRequest {
            product_id: product.product_id.clone(),
            facility_id,
            quantity: node.quantity(),
            start_date,
            routing_id: request.routing_id.clone(),
            order_name,
            description: request.description.clone(),
        };

        let order = match self.orders.create_production_order(&order_request) {
            Ok(order) => order,
            Err(e) => {
                error!(
                    product_id = %order_request.product_id,
                    error = %e,
                    "生产订单创建失败"
                );
                return Ok(ManufacturingOrderOutcome::none());
            }
        };
        debug!(
            order_id = %order.order_id,
            product_id = %order_request.product_id,
            quantity = order_request.quantity,
            start_date = %start_date,
            estimated_completion = %order.estimated_completion,
            "生产订单已创建"
        );

        if let Some(source) = &request.source_order {
            if let Err(e) =
                self.orders
                    .link_fulfillment(&order.order_id, &source.order_id, &source.line_id)
            {
                error!(
                    order_id = %order.order_id,
                    source_order_id = %source.order_id,
                    error = %e,
                    "履约关联创建失败"
                );
            }
        }

        for child_order_id in &child_order_ids {
            if let Err(e) =
                self.orders
                    .link_precedence(child_order_id, &order.order_id, request.start_date)
            {
                error!(
                    from_order_id = %child_order_id,
                    to_order_id = %order.order_id,
                    error = %e,
                    "订单前置关系创建失败"
                );
            }
        }

        Ok(ManufacturingOrderOutcome::created(order))
    }
}
