// ==========================================
// BOM 引擎 - 内存网关
// ==========================================
// 职责: 不依赖 SQLite 的 CatalogGateway / ProductionOrderGateway 实现
// 用途: 引擎单元测试、嵌入式调用方；支持按产品注入失败
// ==========================================

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{
    days_to_duration, matching_variants, BomEdge, ManufacturingRule, Product, ProductionOrderRef,
    ProductionOrderRequest, RuleScope, SelectedFeature,
};
use crate::engine::gateway::{CatalogGateway, ProductionOrderGateway};
use crate::repository::error::{RepositoryError, RepositoryResult};

#[derive(Debug, Clone)]
struct VariantRecord {
    virtual_product_id: String,
    variant_product_id: String,
    features: Vec<SelectedFeature>,
}

#[derive(Debug, Clone)]
struct FacilityRecord {
    product_id: String,
    facility_id: String,
    lead_time_days: Option<f64>,
    minimum_stock: Option<f64>, // 有值即存在库存策略
}

// ==========================================
// InMemoryCatalog
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: HashMap<String, Product>,
    edges: Vec<BomEdge>,
    manufactured_as: HashMap<String, String>,
    variants: Vec<VariantRecord>,
    rules: Vec<ManufacturingRule>,
    standard_features: HashMap<String, Vec<SelectedFeature>>,
    supplier_products: HashSet<String>,
    facilities: Vec<FacilityRecord>,
    failing_products: HashSet<String>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&mut self, product: Product) -> &mut Self {
        self.products.insert(product.product_id.clone(), product);
        self
    }

    pub fn add_edge(&mut self, edge: BomEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// 登记 "product 按 target 制造"
    pub fn set_manufactured_as(&mut self, product_id: &str, target_id: &str) -> &mut Self {
        self.manufactured_as
            .insert(product_id.to_string(), target_id.to_string());
        self
    }

    /// 登记虚拟产品的变体及其区分特征
    pub fn add_variant(
        &mut self,
        virtual_product_id: &str,
        variant_product_id: &str,
        features: Vec<SelectedFeature>,
    ) -> &mut Self {
        self.variants.push(VariantRecord {
            virtual_product_id: virtual_product_id.to_string(),
            variant_product_id: variant_product_id.to_string(),
            features,
        });
        self
    }

    pub fn add_rule(&mut self, rule: ManufacturingRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn add_standard_feature(&mut self, product_id: &str, feature: SelectedFeature) -> &mut Self {
        self.standard_features
            .entry(product_id.to_string())
            .or_default()
            .push(feature);
        self
    }

    /// 登记长期有效的首选供应商记录
    pub fn add_supplier_record(&mut self, product_id: &str) -> &mut Self {
        self.supplier_products.insert(product_id.to_string());
        self
    }

    /// 登记带库存策略的设施（库存管理件）
    pub fn add_stocking_facility(
        &mut self,
        product_id: &str,
        facility_id: &str,
        lead_time_days: Option<f64>,
    ) -> &mut Self {
        self.facilities.push(FacilityRecord {
            product_id: product_id.to_string(),
            facility_id: facility_id.to_string(),
            lead_time_days,
            minimum_stock: Some(0.0),
        });
        self
    }

    /// 只登记设施提前期，不设库存策略（不影响库存管理判定）
    pub fn add_facility_lead_time(
        &mut self,
        product_id: &str,
        facility_id: &str,
        lead_time_days: f64,
    ) -> &mut Self {
        self.facilities.push(FacilityRecord {
            product_id: product_id.to_string(),
            facility_id: facility_id.to_string(),
            lead_time_days: Some(lead_time_days),
            minimum_stock: None,
        });
        self
    }

    /// 之后对该产品的查询全部返回数据库错误
    pub fn fail_for(&mut self, product_id: &str) -> &mut Self {
        self.failing_products.insert(product_id.to_string());
        self
    }

    fn check(&self, product_id: &str) -> RepositoryResult<()> {
        if self.failing_products.contains(product_id) {
            return Err(RepositoryError::DatabaseQueryError(format!(
                "模拟查询失败: product_id={}",
                product_id
            )));
        }
        Ok(())
    }
}

impl CatalogGateway for InMemoryCatalog {
    fn find_product(&self, product_id: &str) -> RepositoryResult<Option<Product>> {
        self.check(product_id)?;
        Ok(self.products.get(product_id).cloned())
    }

    fn find_bom_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>> {
        self.check(product_id)?;
        let mut edges: Vec<BomEdge> = self
            .edges
            .iter()
            .filter(|e| e.parent_product_id == product_id && e.bom_type == bom_type)
            .filter(|e| e.matches_routing(routing_id) && e.is_valid_at(as_of))
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.sequence_num);
        Ok(edges)
    }

    fn find_parent_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>> {
        self.check(product_id)?;
        let mut edges: Vec<BomEdge> = self
            .edges
            .iter()
            .filter(|e| e.child_product_id == product_id && e.bom_type == bom_type)
            .filter(|e| e.matches_routing(routing_id) && e.is_valid_at(as_of))
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.sequence_num);
        Ok(edges)
    }

    fn find_manufactured_as(
        &self,
        product_id: &str,
        _as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>> {
        self.check(product_id)?;
        Ok(self.manufactured_as.get(product_id).cloned())
    }

    fn find_virtual_parent(
        &self,
        product_id: &str,
        _as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>> {
        self.check(product_id)?;
        Ok(self
            .variants
            .iter()
            .find(|v| v.variant_product_id == product_id)
            .map(|v| v.virtual_product_id.clone()))
    }

    fn find_manufacturing_rules(
        &self,
        scope: &RuleScope,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<ManufacturingRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| scope.matches(r) && r.is_valid_at(as_of))
            .cloned()
            .collect())
    }

    fn find_selected_features(
        &self,
        product_id: &str,
        _as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<SelectedFeature>> {
        self.check(product_id)?;
        Ok(self
            .standard_features
            .get(product_id)
            .cloned()
            .unwrap_or_default())
    }

    fn resolve_variant(
        &self,
        virtual_product_id: &str,
        selected_features: &[SelectedFeature],
    ) -> RepositoryResult<Vec<Product>> {
        self.check(virtual_product_id)?;
        let candidates: Vec<(String, Vec<SelectedFeature>)> = self
            .variants
            .iter()
            .filter(|v| v.virtual_product_id == virtual_product_id)
            .map(|v| (v.variant_product_id.clone(), v.features.clone()))
            .collect();

        Ok(matching_variants(&candidates, selected_features)
            .into_iter()
            .filter_map(|idx| self.products.get(&candidates[idx].0).cloned())
            .collect())
    }

    fn has_valid_supplier_record(
        &self,
        product_id: &str,
        _as_of: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        self.check(product_id)?;
        Ok(self.supplier_products.contains(product_id))
    }

    fn has_stocking_facility(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<bool> {
        self.check(product_id)?;
        Ok(self.facilities.iter().any(|s| {
            s.product_id == product_id
                && s.minimum_stock.is_some()
                && facility_id.map_or(true, |f| s.facility_id == f)
        }))
    }

    fn facility_lead_time_days(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<Option<f64>> {
        self.check(product_id)?;
        Ok(self
            .facilities
            .iter()
            .filter(|s| s.product_id == product_id)
            .filter(|s| facility_id.map_or(true, |f| s.facility_id == f))
            .find_map(|s| s.lead_time_days))
    }
}

// ==========================================
// InMemoryOrderGateway
// ==========================================

/// 已记录的生产订单
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub order_id: String,
    pub request: ProductionOrderRequest,
    pub estimated_completion: NaiveDateTime,
}

/// 已记录的前置关系 (from, to, as_of)
pub type RecordedPrecedence = (String, String, NaiveDateTime);

/// 已记录的履约关联 (order_id, source_order_id, source_line_id)
pub type RecordedFulfillment = (String, String, String);

#[derive(Debug, Default)]
struct OrderLog {
    orders: Vec<RecordedOrder>,
    precedences: Vec<RecordedPrecedence>,
    fulfillments: Vec<RecordedFulfillment>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderGateway {
    log: Mutex<OrderLog>,
    lead_times: HashMap<String, f64>,
    default_lead_time_days: f64,
    failing_products: HashSet<String>,
}

impl InMemoryOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lead_time(mut self, product_id: &str, days: f64) -> Self {
        self.lead_times.insert(product_id.to_string(), days);
        self
    }

    pub fn with_default_lead_time(mut self, days: f64) -> Self {
        self.default_lead_time_days = days;
        self
    }

    /// 为该产品下单时返回错误
    pub fn fail_for(mut self, product_id: &str) -> Self {
        self.failing_products.insert(product_id.to_string());
        self
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, OrderLog>> {
        self.log
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn snapshot(&self) -> MutexGuard<'_, OrderLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.snapshot().orders.clone()
    }

    pub fn order_for_product(&self, product_id: &str) -> Option<RecordedOrder> {
        self.snapshot()
            .orders
            .iter()
            .find(|o| o.request.product_id == product_id)
            .cloned()
    }

    pub fn precedences(&self) -> Vec<RecordedPrecedence> {
        self.snapshot().precedences.clone()
    }

    pub fn fulfillments(&self) -> Vec<RecordedFulfillment> {
        self.snapshot().fulfillments.clone()
    }
}

impl ProductionOrderGateway for InMemoryOrderGateway {
    fn create_production_order(
        &self,
        request: &ProductionOrderRequest,
    ) -> RepositoryResult<ProductionOrderRef> {
        if self.failing_products.contains(&request.product_id) {
            return Err(RepositoryError::InternalError(format!(
                "模拟下单失败: product_id={}",
                request.product_id
            )));
        }

        let lead_days = self
            .lead_times
            .get(&request.product_id)
            .copied()
            .unwrap_or(self.default_lead_time_days);
        let estimated_completion = request.start_date + days_to_duration(lead_days);

        let mut log = self.lock()?;
        let order_id = format!("PO-{:04}", log.orders.len() + 1);
        log.orders.push(RecordedOrder {
            order_id: order_id.clone(),
            request: request.clone(),
            estimated_completion,
        });

        Ok(ProductionOrderRef {
            order_id,
            estimated_completion,
        })
    }

    fn link_fulfillment(
        &self,
        order_id: &str,
        source_order_id: &str,
        source_line_id: &str,
    ) -> RepositoryResult<()> {
        self.lock()?.fulfillments.push((
            order_id.to_string(),
            source_order_id.to_string(),
            source_line_id.to_string(),
        ));
        Ok(())
    }

    fn link_precedence(
        &self,
        from_order_id: &str,
        to_order_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<()> {
        self.lock()?.precedences.push((
            from_order_id.to_string(),
            to_order_id.to_string(),
            as_of,
        ));
        Ok(())
    }
}
