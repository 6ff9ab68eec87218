// ==========================================
// BOM 引擎 - 外部协作者接口
// ==========================================
// 职责: 定义引擎消费的目录查询/生产订单/自定义用量接口
// 说明: Engine 层定义 trait，Repository 层实现（SQLite / 内存）
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::domain::{
    BomEdge, ManufacturingRule, Product, ProductionOrderRef, ProductionOrderRequest, RuleScope,
    SelectedFeature,
};
use crate::repository::error::RepositoryResult;

// ==========================================
// CatalogGateway - 目录只读接口
// ==========================================

/// 产品/BOM/规则/特征/供应商/库存设置的只读查询
///
/// 所有方法均为同步阻塞调用，失败以 `RepositoryError` 返回
pub trait CatalogGateway: Send + Sync {
    /// 按 ID 查询产品
    fn find_product(&self, product_id: &str) -> RepositoryResult<Option<Product>>;

    /// 查询子件边（按 sequence_num 升序）
    ///
    /// `routing_id = None` 只返回不限工艺路线的通用边
    fn find_bom_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>>;

    /// 查询父项边（反查方向，按 sequence_num 升序）
    fn find_parent_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>>;

    /// 查询 "按另一产品制造" 重定向
    fn find_manufactured_as(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>>;

    /// 查询变体所属的虚拟产品（非变体返回 None）
    fn find_virtual_parent(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>>;

    /// 查询制造规则（已按有效期过滤，保持列表顺序）
    fn find_manufacturing_rules(
        &self,
        scope: &RuleScope,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<ManufacturingRule>>;

    /// 查询产品上应用的标准特征（作为配置器的已选特征）
    fn find_selected_features(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<SelectedFeature>>;

    /// 按已选特征查找虚拟产品的具体变体（引擎只接受唯一匹配）
    fn resolve_variant(
        &self,
        virtual_product_id: &str,
        selected_features: &[SelectedFeature],
    ) -> RepositoryResult<Vec<Product>>;

    /// 是否存在 as_of 时点有效的首选供应商记录
    fn has_valid_supplier_record(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<bool>;

    /// 是否存在库存策略（最低库存设置；facility_id 为空时任意工厂）
    ///
    /// 只有提前期、没有库存策略的设施记录不算库存管理
    fn has_stocking_facility(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<bool>;

    /// 工厂提前期（天）
    fn facility_lead_time_days(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<Option<f64>>;
}

// ==========================================
// ProductionOrderGateway - 生产订单原语
// ==========================================

/// 生产订单创建与关联
///
/// 引擎不包事务：调用即生效，失败时已创建的订单保留
pub trait ProductionOrderGateway: Send + Sync {
    fn create_production_order(
        &self,
        request: &ProductionOrderRequest,
    ) -> RepositoryResult<ProductionOrderRef>;

    /// 关联销售订单行履约
    fn link_fulfillment(
        &self,
        order_id: &str,
        source_order_id: &str,
        source_line_id: &str,
    ) -> RepositoryResult<()>;

    /// 添加前置依赖：from 完成后 to 才能开始
    fn link_precedence(
        &self,
        from_order_id: &str,
        to_order_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<()>;
}

// ==========================================
// CustomQuantityCalculator - 自定义用量计算
// ==========================================

/// 自定义用量计算输入
#[derive(Debug, Clone, PartialEq)]
pub struct CustomCalcInput {
    pub product_id: String,
    pub needed_quantity: f64, // 父项数量 × 单位用量
    pub amount: f64,          // 树根金额
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

/// 按名称调用的外部用量计算
pub trait CustomQuantityCalculator: Send + Sync {
    /// 返回 None 表示该方法未给出结果，引擎回退到标准公式
    fn calculate(&self, method: &str, input: &CustomCalcInput) -> anyhow::Result<Option<f64>>;
}

// ==========================================
// BomGateways - 协作者集合
// ==========================================

/// 聚合引擎所需的全部协作者，简化依赖注入
#[derive(Clone)]
pub struct BomGateways {
    pub catalog: Arc<dyn CatalogGateway>,
    pub orders: Arc<dyn ProductionOrderGateway>,
    pub calculator: Option<Arc<dyn CustomQuantityCalculator>>,
}

impl BomGateways {
    pub fn new(
        catalog: Arc<dyn CatalogGateway>,
        orders: Arc<dyn ProductionOrderGateway>,
    ) -> Self {
        Self {
            catalog,
            orders,
            calculator: None,
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn CustomQuantityCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    pub fn catalog(&self) -> &dyn CatalogGateway {
        self.catalog.as_ref()
    }

    pub fn orders(&self) -> &dyn ProductionOrderGateway {
        self.orders.as_ref()
    }

    pub fn calculator(&self) -> Option<&dyn CustomQuantityCalculator> {
        self.calculator.as_deref()
    }
}
