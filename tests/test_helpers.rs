// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化、目录测试数据写入
// ==========================================
#![allow(dead_code)]

use bom_engine::domain::{bom_types, BomEdge, Product};
use bom_engine::repository::CatalogRepository;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();

    let conn = bom_engine::db::open_sqlite_connection(&db_path)?;
    bom_engine::db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（供多个仓储共用）
pub fn open_shared_connection(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    let conn = bom_engine::db::open_sqlite_connection(db_path)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 固定的评估时点
pub fn as_of() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

/// 很早的生效日期（供应商/特征等记录用）
pub fn long_ago() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn edge(parent: &str, child: &str, quantity: f64) -> BomEdge {
    BomEdge::new(parent, child, bom_types::MANUF_COMPONENT, quantity)
}

/// 写入 A -(2, 损耗 10%)-> B -(3)-> C
pub fn seed_chain(repo: &CatalogRepository) -> Result<(), Box<dyn Error>> {
    for id in ["A", "B", "C"] {
        repo.upsert_product(&Product::new(id).with_name(format!("产品{}", id)))?;
    }
    repo.insert_bom_edge(&edge("A", "B", 2.0).with_scrap(10.0))?;
    repo.insert_bom_edge(&edge("B", "C", 3.0))?;
    Ok(())
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
