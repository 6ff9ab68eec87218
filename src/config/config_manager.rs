// ==========================================
// BOM 引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 缺失或无法解析的配置项回退默认值并告警，不报错
// ==========================================

use crate::config::bom_config::BomEngineConfig;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值；缺失或解析失败时返回默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 读取引擎配置（默认值 + global 覆写）
    pub fn get_bom_engine_config(&self) -> Result<BomEngineConfig, Box<dyn Error>> {
        let defaults = BomEngineConfig::default();

        let default_bom_type = self
            .get_config_value(config_keys::DEFAULT_BOM_TYPE)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_bom_type);

        let default_facility_id = self
            .get_config_value(config_keys::DEFAULT_FACILITY_ID)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or(defaults.default_facility_id);

        let mut default_lead_time_days = self.get_parsed_or(
            config_keys::DEFAULT_LEAD_TIME_DAYS,
            defaults.default_lead_time_days,
        )?;
        if !default_lead_time_days.is_finite() || default_lead_time_days < 0.0 {
            warn!(
                config_key = config_keys::DEFAULT_LEAD_TIME_DAYS,
                value = default_lead_time_days,
                "默认提前期无效，使用默认值"
            );
            default_lead_time_days = defaults.default_lead_time_days;
        }

        let mut max_depth = self.get_parsed_or(config_keys::MAX_DEPTH, defaults.max_depth)?;
        if max_depth == 0 {
            warn!(config_key = config_keys::MAX_DEPTH, "最大层级不能为 0，使用默认值");
            max_depth = defaults.max_depth;
        }

        let exclude_wip_by_default = match self.get_config_value(config_keys::EXCLUDE_WIP)? {
            Some(v) => parse_bool(&v).unwrap_or_else(|| {
                warn!(config_key = config_keys::EXCLUDE_WIP, raw_value = %v, "配置值格式错误，使用默认值");
                defaults.exclude_wip_by_default
            }),
            None => defaults.exclude_wip_by_default,
        };

        Ok(BomEngineConfig {
            default_bom_type,
            default_facility_id,
            default_lead_time_days,
            max_depth,
            exclude_wip_by_default,
        })
    }

    /// 获取所有 global 配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复 global 配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const DEFAULT_BOM_TYPE: &str = "bom/default_bom_type";
    pub const DEFAULT_FACILITY_ID: &str = "bom/default_facility_id";
    pub const DEFAULT_LEAD_TIME_DAYS: &str = "bom/default_lead_time_days";
    pub const MAX_DEPTH: &str = "bom/max_depth";
    pub const EXCLUDE_WIP: &str = "bom/exclude_wip";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_empty_table_yields_defaults() {
        let config = manager().get_bom_engine_config().unwrap();
        assert_eq!(config, BomEngineConfig::default());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::DEFAULT_BOM_TYPE, "ENGINEERING_COMPONENT").unwrap();
        mgr.set_global_config_value(config_keys::DEFAULT_FACILITY_ID, "F1").unwrap();
        mgr.set_global_config_value(config_keys::DEFAULT_LEAD_TIME_DAYS, "1.5").unwrap();
        mgr.set_global_config_value(config_keys::MAX_DEPTH, "abc").unwrap();
        mgr.set_global_config_value(config_keys::EXCLUDE_WIP, "yes").unwrap();

        let config = mgr.get_bom_engine_config().unwrap();
        assert_eq!(config.default_bom_type, "ENGINEERING_COMPONENT");
        assert_eq!(config.default_facility_id.as_deref(), Some("F1"));
        assert_eq!(config.default_lead_time_days, 1.5);
        assert_eq!(config.max_depth, 64);
        assert!(config.exclude_wip_by_default);
    }

    #[test]
    fn test_snapshot_restore() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::MAX_DEPTH, "12").unwrap();
        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("bom/max_depth"));

        mgr.set_global_config_value(config_keys::MAX_DEPTH, "3").unwrap();
        assert_eq!(mgr.restore_config_from_snapshot(&snapshot).unwrap(), 1);
        assert_eq!(mgr.get_bom_engine_config().unwrap().max_depth, 12);
    }
}
