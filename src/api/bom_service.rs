// ==========================================
// BOM 引擎 - BOM 服务 API
// ==========================================
// 职责: 组装网关 + 配置，对外提供 BOM 查询与制造订单级联
// 说明: 每次调用新建一棵树，调用之间不共享可变状态
// ==========================================

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{BomEngineConfig, ConfigManager};
use crate::domain::{ManufacturingOrderOutcome, SelectedFeature, SourceOrderLine, TraversalMode};
use crate::engine::{
    BomGateways, BomNode, BomTree, BomTreeRequest, ManufacturingOrderCascade,
    ManufacturingOrderRequest,
};
use crate::perf::PerfGuard;
use crate::repository::{CatalogRepository, ProductionOrderRepository};

// ==========================================
// 请求/响应结构
// ==========================================

/// 单层组件需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLine {
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: f64,
    pub quantity_multiplier: f64,
    pub scrap_factor: f64,
    pub sequence_num: i64,
    pub is_virtual: bool,
    /// 经配置器替换时，被替换的虚拟产品
    pub substituted_product_id: Option<String>,
    pub rule_id: Option<String>,
}

/// 制造订单级联请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingOrdersRequest {
    pub product_id: String,
    pub quantity: f64,
    #[serde(default)]
    pub amount: f64,
    pub start_date: NaiveDateTime,
    pub facility_id: Option<String>,
    pub routing_id: Option<String>,
    pub order_name: Option<String>,
    pub description: Option<String>,
    pub source_order: Option<SourceOrderLine>,
    pub shipment_id: Option<String>,
}

impl ManufacturingOrdersRequest {
    pub fn new(product_id: impl Into<String>, quantity: f64, start_date: NaiveDateTime) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            amount: 0.0,
            start_date,
            facility_id: None,
            routing_id: None,
            order_name: None,
            description: None,
            source_order: None,
            shipment_id: None,
        }
    }
}

/// 未配置的虚拟子件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfiguredPart {
    pub product_id: String,
    pub parent_product_id: Option<String>,
}

// ==========================================
// BomService
// ==========================================
pub struct BomService {
    gateways: BomGateways,
    config: BomEngineConfig,
}

impl BomService {
    pub fn new(gateways: BomGateways, config: BomEngineConfig) -> Self {
        Self { gateways, config }
    }

    /// 基于共享 SQLite 连接组装服务（建表 + 读取 config_kv 覆写）
    pub fn from_sqlite(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let mut guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("锁获取失败: {}", e)))?;
            crate::db::init_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
            crate::perf::install_sqlite_tracing(&mut guard);
        }

        let config = ConfigManager::from_connection(conn.clone())
            .and_then(|mgr| mgr.get_bom_engine_config())
            .map_err(|e| ApiError::InternalError(format!("配置加载失败: {}", e)))?;

        let catalog = Arc::new(CatalogRepository::from_connection(conn.clone()));
        let orders = Arc::new(ProductionOrderRepository::from_connection(
            conn,
            config.default_lead_time_days,
        ));

        Ok(Self::new(BomGateways::new(catalog, orders), config))
    }

    pub fn config(&self) -> &BomEngineConfig {
        &self.config
    }

    pub fn gateways(&self) -> &BomGateways {
        &self.gateways
    }

    // ==========================================
    // 树构建
    // ==========================================

    /// 构建 BOM 树（BOM 类型为空时使用默认 BOM 类型）
    pub fn build_tree(&self, mut request: BomTreeRequest) -> ApiResult<BomTree> {
        let _perf = PerfGuard::new("bom_service.build_tree");
        validate_product_id(&request.product_id)?;
        if request.bom_type.trim().is_empty() {
            request.bom_type = self.config.default_bom_type.clone();
        }
        Ok(BomTree::build(
            request,
            self.gateways.catalog(),
            &self.config,
        )?)
    }

    fn explode(
        &self,
        product_id: &str,
        mode: TraversalMode,
        as_of: Option<NaiveDateTime>,
        routing_id: Option<&str>,
    ) -> ApiResult<BomTree> {
        let mut request = BomTreeRequest::new(product_id, self.config.default_bom_type.clone(), mode);
        request.as_of = as_of;
        request.routing_id = routing_id.map(str::to_string);
        self.build_tree(request)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 直接组件及其需求数量（单层展开，不含根）
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn manufacturing_components(
        &self,
        product_id: &str,
        quantity: f64,
        amount: f64,
        as_of: Option<NaiveDateTime>,
        routing_id: Option<&str>,
    ) -> ApiResult<Vec<ComponentLine>> {
        validate_quantity("quantity", quantity)?;
        validate_quantity("amount", amount)?;

        let mut tree = self.explode(
            product_id,
            TraversalMode::ExplosionSingleLevel,
            as_of,
            routing_id,
        )?;
        tree.set_root_quantity(quantity);
        tree.set_root_amount(amount);
        let flat = tree.flatten(0, false, self.gateways.calculator())?;

        let lines: Vec<ComponentLine> = flat
            .into_iter()
            .skip(1)
            .map(|id| component_line(&tree, tree.node(id)))
            .collect();
        info!(component_count = lines.len(), "组件需求计算完成");
        Ok(lines)
    }

    /// 低层码：产品在所有上层结构中的最大深度
    pub fn low_level_code(
        &self,
        product_id: &str,
        bom_type: Option<&str>,
        as_of: Option<NaiveDateTime>,
    ) -> ApiResult<usize> {
        let bom_type = bom_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.config.default_bom_type.as_str());
        let mut request = BomTreeRequest::new(product_id, bom_type, TraversalMode::Implosion);
        request.as_of = as_of;
        let tree = self.build_tree(request)?;
        Ok(tree.max_depth())
    }

    /// 毛需求：全展开后按产品汇总（不含根产品）
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn net_requirements(
        &self,
        product_id: &str,
        quantity: f64,
        as_of: Option<NaiveDateTime>,
        routing_id: Option<&str>,
        exclude_wip: Option<bool>,
    ) -> ApiResult<HashMap<String, f64>> {
        validate_quantity("quantity", quantity)?;

        let mut tree = self.explode(product_id, TraversalMode::Explosion, as_of, routing_id)?;
        tree.set_root_quantity(quantity);
        let exclude_wip = exclude_wip.unwrap_or(self.config.exclude_wip_by_default);
        let flat = tree.flatten(0, exclude_wip, self.gateways.calculator())?;

        let totals = tree.sum_quantities_over(flat.get(1..).unwrap_or(&[]));
        info!(product_count = totals.len(), exclude_wip, "需求汇总完成");
        Ok(totals)
    }

    /// 规则解析后仍为虚拟产品的子件
    pub fn unconfigured_parts(
        &self,
        product_id: &str,
        as_of: Option<NaiveDateTime>,
        selected_features: Option<Vec<SelectedFeature>>,
    ) -> ApiResult<Vec<UnconfiguredPart>> {
        let mut request = BomTreeRequest::new(
            product_id,
            self.config.default_bom_type.clone(),
            TraversalMode::Explosion,
        );
        request.as_of = as_of;
        request.selected_features = selected_features;
        let tree = self.build_tree(request)?;

        Ok(tree
            .unconfigured_nodes()
            .into_iter()
            .map(|id| {
                let node = tree.node(id);
                UnconfiguredPart {
                    product_id: node.product_id().to_string(),
                    parent_product_id: node
                        .parent()
                        .map(|p| tree.node(p).product_id().to_string()),
                }
            })
            .collect())
    }

    // ==========================================
    // 制造订单
    // ==========================================

    /// 按制造展开树逐级创建生产订单，返回根订单
    #[instrument(skip(self, request), fields(
        product_id = %request.product_id,
        quantity = request.quantity
    ))]
    pub fn create_manufacturing_orders(
        &self,
        request: &ManufacturingOrdersRequest,
    ) -> ApiResult<ManufacturingOrderOutcome> {
        let _perf = PerfGuard::new("bom_service.create_manufacturing_orders");
        validate_quantity("quantity", request.quantity)?;
        validate_quantity("amount", request.amount)?;

        let mut tree = self.explode(
            &request.product_id,
            TraversalMode::ExplosionManufacturing,
            Some(request.start_date),
            request.routing_id.as_deref(),
        )?;
        tree.set_root_quantity(request.quantity);
        tree.set_root_amount(request.amount);

        let facility_id = request
            .facility_id
            .clone()
            .or_else(|| self.config.default_facility_id.clone());

        let cascade_request = ManufacturingOrderRequest {
            facility_id,
            start_date: request.start_date,
            order_name: request.order_name.clone(),
            description: request.description.clone(),
            routing_id: request.routing_id.clone(),
            source_order: request.source_order.clone(),
            shipment_id: request.shipment_id.clone(),
        };

        let cascade = ManufacturingOrderCascade::new(self.gateways.catalog(), self.gateways.orders())
            .with_calculator(self.gateways.calculator());
        Ok(cascade.run(&mut tree, &cascade_request)?)
    }

    /// 以当前时间为开工日期下单
    pub fn create_manufacturing_orders_now(
        &self,
        product_id: &str,
        quantity: f64,
    ) -> ApiResult<ManufacturingOrderOutcome> {
        let request = ManufacturingOrdersRequest::new(product_id, quantity, Utc::now().naive_utc());
        self.create_manufacturing_orders(&request)
    }
}

fn component_line(tree: &BomTree, node: &BomNode) -> ComponentLine {
    ComponentLine {
        product_id: node.product_id().to_string(),
        product_name: node.product().product_name.clone(),
        quantity: node.quantity(),
        quantity_multiplier: node.quantity_multiplier(),
        scrap_factor: node.scrap_factor(),
        sequence_num: node.edge().map(|e| e.sequence_num).unwrap_or_default(),
        is_virtual: node.is_virtual(),
        substituted_product_id: node
            .substituted()
            .map(|s| tree.node(s).product_id().to_string()),
        rule_id: node.rule_applied().map(|r| r.rule_id.clone()),
    }
}

// ==========================================
// 输入校验
// ==========================================

fn validate_product_id(product_id: &str) -> ApiResult<()> {
    if product_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("产品ID不能为空".to_string()));
    }
    Ok(())
}

fn validate_quantity(field: &str, value: f64) -> ApiResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::InvalidInput(format!(
            "{}必须为非负有限数: {}",
            field, value
        )));
    }
    Ok(())
}
