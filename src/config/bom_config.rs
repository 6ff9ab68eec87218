// ==========================================
// BOM 引擎 - 引擎配置
// ==========================================
// 默认值可被 config_kv 表中的 global 配置覆写（见 ConfigManager）
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::bom_types;

/// 引擎运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BomEngineConfig {
    /// 未指定时使用的 BOM 类型
    pub default_bom_type: String,
    /// 下单时请求与产品都未给出工厂时使用
    pub default_facility_id: Option<String>,
    /// 无工厂提前期记录时的默认提前期（天）
    pub default_lead_time_days: f64,
    /// 树的最大层级（根为 0）
    pub max_depth: usize,
    pub exclude_wip_by_default: bool,
}

impl Default for BomEngineConfig {
    fn default() -> Self {
        Self {
            default_bom_type: bom_types::MANUF_COMPONENT.to_string(),
            default_facility_id: None,
            default_lead_time_days: 0.0,
            max_depth: 64,
            exclude_wip_by_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BomEngineConfig::default();
        assert_eq!(config.default_bom_type, "MANUF_COMPONENT");
        assert_eq!(config.default_facility_id, None);
        assert_eq!(config.default_lead_time_days, 0.0);
        assert_eq!(config.max_depth, 64);
        assert!(!config.exclude_wip_by_default);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BomEngineConfig = serde_json::from_str(r#"{"max_depth": 8}"#).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.default_bom_type, "MANUF_COMPONENT");
    }
}
