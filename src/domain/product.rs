// ==========================================
// BOM 引擎 - 产品领域模型
// ==========================================
// 职责: 产品主数据 + 根产品已选特征
// 红线: 只读，引擎不回写产品
// ==========================================

use crate::domain::types::ProductType;
use serde::{Deserialize, Serialize};

// ==========================================
// Product - 产品
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: Option<String>,
    pub product_type: ProductType,
    pub is_virtual: bool,               // 虚拟（模板）产品，需配置器替换为具体变体
    pub facility_id: Option<String>,    // 默认生产工厂

    // ===== 物理属性 (自定义用量公式使用) =====
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
}

impl Product {
    /// 创建普通产品
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: None,
            product_type: ProductType::Good,
            is_virtual: false,
            facility_id: None,
            width: None,
            height: None,
            depth: None,
        }
    }

    /// 创建虚拟（模板）产品
    pub fn new_virtual(product_id: impl Into<String>) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(product_id)
        }
    }

    pub fn with_type(mut self, product_type: ProductType) -> Self {
        self.product_type = product_type;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.facility_id = Some(facility_id.into());
        self
    }

    pub fn with_dimensions(mut self, width: f64, height: f64, depth: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self.depth = Some(depth);
        self
    }

    /// 是否为在制品
    pub fn is_wip(&self) -> bool {
        self.product_type == ProductType::Wip
    }
}

// ==========================================
// SelectedFeature - 根产品已选特征
// ==========================================
// 配置器条件匹配按 feature_id；变体查找按 feature_type → feature_id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedFeature {
    pub feature_id: String,
    pub feature_type: String,
}

impl SelectedFeature {
    pub fn new(feature_id: impl Into<String>, feature_type: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            feature_type: feature_type.into(),
        }
    }
}

/// 按已选特征筛选变体，返回匹配变体的下标
///
/// 只有变体区分特征中出现过的特征类型参与匹配；变体需带有全部参与匹配的已选特征。
/// 没有任何已选特征参与匹配时返回空。
pub fn matching_variants(
    variants: &[(String, Vec<SelectedFeature>)],
    selected_features: &[SelectedFeature],
) -> Vec<usize> {
    let relevant: Vec<&SelectedFeature> = selected_features
        .iter()
        .filter(|s| {
            variants
                .iter()
                .any(|(_, features)| features.iter().any(|f| f.feature_type == s.feature_type))
        })
        .collect();
    if relevant.is_empty() {
        return Vec::new();
    }

    variants
        .iter()
        .enumerate()
        .filter(|(_, (_, features))| {
            relevant
                .iter()
                .all(|s| features.iter().any(|f| f.feature_id == s.feature_id))
        })
        .map(|(idx, _)| idx)
        .collect()
}
