// ==========================================
// BOM 引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建立目录表（产品/BOM/规则/特征/供应商/工厂）与订单表
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 日期列存储格式（字符串比较与时间先后一致）
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 日期 -> 列值
pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// 列值 -> 日期（兼容带小数秒与 'T' 分隔的写法）
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并登记 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

// 日期列统一存储为 "YYYY-MM-DD HH:MM:SS"（rusqlite chrono 格式），按字符串比较
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS product (
    product_id      TEXT PRIMARY KEY,
    product_name    TEXT,
    product_type    TEXT NOT NULL DEFAULT 'GOOD',
    is_virtual      INTEGER NOT NULL DEFAULT 0,
    facility_id     TEXT,
    width           REAL,
    height          REAL,
    depth           REAL
);

-- BOM 边（assoc_type 为 BOM 类型）以及 MANUFACTURED_AS / VARIANT 关联
CREATE TABLE IF NOT EXISTS product_assoc (
    assoc_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id              TEXT NOT NULL,
    product_id_to           TEXT NOT NULL,
    assoc_type              TEXT NOT NULL,
    quantity                TEXT,
    scrap_factor            REAL,
    sequence_num            INTEGER NOT NULL DEFAULT 0,
    routing_id              TEXT,
    from_date               TEXT NOT NULL,
    thru_date               TEXT,
    estimate_calc_method    TEXT
);
CREATE INDEX IF NOT EXISTS idx_product_assoc_from ON product_assoc (product_id, assoc_type);
CREATE INDEX IF NOT EXISTS idx_product_assoc_to ON product_assoc (product_id_to, assoc_type);

CREATE TABLE IF NOT EXISTS manufacturing_rule (
    rule_id                 TEXT PRIMARY KEY,
    context_product_id      TEXT,
    for_product_id          TEXT,
    in_product_id           TEXT NOT NULL,
    substitute_product_id   TEXT,
    feature_condition       TEXT,
    rule_operator           TEXT,
    quantity                REAL,
    rule_seq                INTEGER NOT NULL DEFAULT 0,
    from_date               TEXT NOT NULL,
    thru_date               TEXT
);
CREATE INDEX IF NOT EXISTS idx_manufacturing_rule_in ON manufacturing_rule (in_product_id);

CREATE TABLE IF NOT EXISTS product_feature (
    feature_id      TEXT PRIMARY KEY,
    feature_type    TEXT NOT NULL,
    description     TEXT
);

-- appl_type: STANDARD / SELECTABLE / DISTINGUISHING
CREATE TABLE IF NOT EXISTS product_feature_appl (
    product_id      TEXT NOT NULL,
    feature_id      TEXT NOT NULL REFERENCES product_feature (feature_id),
    appl_type       TEXT NOT NULL,
    from_date       TEXT NOT NULL,
    thru_date       TEXT,
    PRIMARY KEY (product_id, feature_id, from_date)
);

CREATE TABLE IF NOT EXISTS supplier_product (
    product_id              TEXT NOT NULL,
    party_id                TEXT NOT NULL,
    supplier_pref_order     INTEGER NOT NULL DEFAULT 1,
    available_from_date     TEXT NOT NULL,
    available_thru_date     TEXT,
    PRIMARY KEY (product_id, party_id, available_from_date)
);

CREATE TABLE IF NOT EXISTS product_facility (
    product_id          TEXT NOT NULL,
    facility_id         TEXT NOT NULL,
    lead_time_days      REAL,
    minimum_stock       REAL,
    PRIMARY KEY (product_id, facility_id)
);

CREATE TABLE IF NOT EXISTS production_order (
    order_id                TEXT PRIMARY KEY,
    product_id              TEXT NOT NULL,
    facility_id             TEXT,
    quantity                REAL NOT NULL,
    start_date              TEXT NOT NULL,
    estimated_completion    TEXT NOT NULL,
    routing_id              TEXT,
    order_name              TEXT,
    description             TEXT,
    status                  TEXT NOT NULL DEFAULT 'CREATED',
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_fulfillment (
    order_id            TEXT NOT NULL REFERENCES production_order (order_id),
    source_order_id     TEXT NOT NULL,
    source_line_id      TEXT NOT NULL,
    PRIMARY KEY (order_id, source_order_id, source_line_id)
);

CREATE TABLE IF NOT EXISTS order_precedence (
    from_order_id   TEXT NOT NULL REFERENCES production_order (order_id),
    to_order_id     TEXT NOT NULL REFERENCES production_order (order_id),
    from_date       TEXT NOT NULL,
    PRIMARY KEY (from_order_id, to_order_id)
);
"#;
