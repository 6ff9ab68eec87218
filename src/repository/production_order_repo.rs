// ==========================================
// BOM 引擎 - 生产订单数据仓储
// ==========================================
// 职责: 实现 ProductionOrderGateway（创建生产订单/履约关联/前置关系）
// 完工估算: 开工时间 + 工厂提前期（无记录时取默认提前期）
// 红线: 每次调用立即落库，不跨调用包事务
// ==========================================

use crate::db::{format_datetime, open_sqlite_connection, parse_datetime};
use crate::domain::{days_to_duration, ProductionOrderRef, ProductionOrderRequest};
use crate::engine::gateway::ProductionOrderGateway;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

// ==========================================
// 实体
// ==========================================

/// production_order 表行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrderEntity {
    pub order_id: String,
    pub product_id: String,
    pub facility_id: Option<String>,
    pub quantity: f64,
    pub start_date: NaiveDateTime,
    pub estimated_completion: NaiveDateTime,
    pub routing_id: Option<String>,
    pub order_name: Option<String>,
    pub description: Option<String>,
    pub status: String,
}

/// order_precedence 表行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPrecedenceEntity {
    pub from_order_id: String,
    pub to_order_id: String,
    pub from_date: NaiveDateTime,
}

/// order_fulfillment 表行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfillmentEntity {
    pub order_id: String,
    pub source_order_id: String,
    pub source_line_id: String,
}

// ==========================================
// ProductionOrderRepository - 生产订单仓储
// ==========================================
pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
    default_lead_time_days: f64,
}

impl ProductionOrderRepository {
    /// 创建新的 ProductionOrderRepository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - default_lead_time_days: 无工厂提前期记录时使用
    pub fn new(db_path: &str, default_lead_time_days: f64) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_lead_time_days,
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>, default_lead_time_days: f64) -> Self {
        Self {
            conn,
            default_lead_time_days,
        }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按订单 ID 查询
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<ProductionOrderEntity>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                r#"
                SELECT order_id, product_id, facility_id, quantity, start_date,
                       estimated_completion, routing_id, order_name, description, status
                FROM production_order
                WHERE order_id = ?1
                "#,
                params![order_id],
                map_order_row,
            )
            .optional()?;
        Ok(order)
    }

    /// 按产品查询订单（按开工时间排序）
    pub fn list_by_product(&self, product_id: &str) -> RepositoryResult<Vec<ProductionOrderEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, product_id, facility_id, quantity, start_date,
                   estimated_completion, routing_id, order_name, description, status
            FROM production_order
            WHERE product_id = ?1
            ORDER BY start_date, created_at
            "#,
        )?;
        let orders = stmt
            .query_map(params![product_id], map_order_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    /// 全部前置关系
    pub fn list_precedences(&self) -> RepositoryResult<Vec<OrderPrecedenceEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT from_order_id, to_order_id, from_date
            FROM order_precedence
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let from_date: String = row.get(2)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, from_date))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(from_order_id, to_order_id, from_date)| {
                Ok(OrderPrecedenceEntity {
                    from_order_id,
                    to_order_id,
                    from_date: require_datetime("from_date", &from_date)?,
                })
            })
            .collect()
    }

    /// 订单的履约关联
    pub fn list_fulfillments(&self, order_id: &str) -> RepositoryResult<Vec<OrderFulfillmentEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, source_order_id, source_line_id
            FROM order_fulfillment
            WHERE order_id = ?1
            ORDER BY source_order_id, source_line_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![order_id], |row| {
                Ok(OrderFulfillmentEntity {
                    order_id: row.get(0)?,
                    source_order_id: row.get(1)?,
                    source_line_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lead_time_days(
        conn: &Connection,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<Option<f64>> {
        let lead_time = conn
            .query_row(
                r#"
                SELECT lead_time_days
                FROM product_facility
                WHERE product_id = ?1
                  AND (?2 IS NULL OR facility_id = ?2)
                  AND lead_time_days IS NOT NULL
                ORDER BY facility_id
                LIMIT 1
                "#,
                params![product_id, facility_id],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(lead_time)
    }
}

impl ProductionOrderGateway for ProductionOrderRepository {
    fn create_production_order(
        &self,
        request: &ProductionOrderRequest,
    ) -> RepositoryResult<ProductionOrderRef> {
        if !request.quantity.is_finite() || request.quantity < 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "quantity".to_string(),
                message: format!("非法数量: {}", request.quantity),
            });
        }

        let conn = self.get_conn()?;
        let lead_days = Self::lead_time_days(
            &conn,
            &request.product_id,
            request.facility_id.as_deref(),
        )?
        .unwrap_or(self.default_lead_time_days);
        let estimated_completion = request.start_date + days_to_duration(lead_days);
        let order_id = Uuid::new_v4().to_string();

        conn.execute(
            r#"
            INSERT INTO production_order (
                order_id, product_id, facility_id, quantity, start_date,
                estimated_completion, routing_id, order_name, description, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'CREATED', ?10)
            "#,
            params![
                order_id,
                request.product_id,
                request.facility_id,
                request.quantity,
                format_datetime(request.start_date),
                format_datetime(estimated_completion),
                request.routing_id,
                request.order_name,
                request.description,
                format_datetime(Utc::now().naive_utc()),
            ],
        )?;

        debug!(
            order_id = %order_id,
            product_id = %request.product_id,
            lead_days,
            "生产订单已落库"
        );

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
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO order_fulfillment (order_id, source_order_id, source_line_id)
            VALUES (?1, ?2, ?3)
            "#,
            params![order_id, source_order_id, source_line_id],
        )?;
        Ok(())
    }

    fn link_precedence(
        &self,
        from_order_id: &str,
        to_order_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO order_precedence (from_order_id, to_order_id, from_date)
            VALUES (?1, ?2, ?3)
            "#,
            params![from_order_id, to_order_id, format_datetime(as_of)],
        )?;
        Ok(())
    }
}

// ==========================================
// 行映射
// ==========================================

fn require_datetime(field: &str, raw: &str) -> RepositoryResult<NaiveDateTime> {
    parse_datetime(raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("无法解析日期: {}", raw),
    })
}

fn map_order_row(row: &Row<'_>) -> rusqlite::Result<ProductionOrderEntity> {
    let start_date: String = row.get(4)?;
    let estimated_completion: String = row.get(5)?;
    Ok(ProductionOrderEntity {
        order_id: row.get(0)?,
        product_id: row.get(1)?,
        facility_id: row.get(2)?,
        quantity: row.get(3)?,
        start_date: parse_column_datetime(4, &start_date)?,
        estimated_completion: parse_column_datetime(5, &estimated_completion)?,
        routing_id: row.get(6)?,
        order_name: row.get(7)?,
        description: row.get(8)?,
        status: row.get(9)?,
    })
}

fn parse_column_datetime(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    parse_datetime(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("无法解析日期: {}", raw).into(),
        )
    })
}
