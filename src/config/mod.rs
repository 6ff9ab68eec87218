// ==========================================
// BOM 引擎 - 配置层
// ==========================================
// 职责: 引擎参数默认值 + config_kv 表覆写
// ==========================================

pub mod bom_config;
pub mod config_manager;

pub use bom_config::BomEngineConfig;
pub use config_manager::{config_keys, ConfigManager};
