// ==========================================
// BOM 引擎 - 产品目录数据仓储
// ==========================================
// 职责: 实现 CatalogGateway（产品/BOM/规则/特征/供应商/工厂）
// 红线: Repository 不含业务逻辑，只负责数据访问
// 有效期: from_date <= as_of AND (thru_date IS NULL OR thru_date > as_of)
// 工艺路线: Some(r) -> routing_id = r；None -> routing_id IS NULL
// ==========================================

use crate::db::{format_datetime, open_sqlite_connection, parse_datetime};
use crate::domain::{
    matching_variants, BomEdge, ManufacturingRule, Product, ProductType, RuleOperator, RuleScope,
    SelectedFeature,
};
use crate::engine::gateway::CatalogGateway;
use crate::engine::scrap::parse_raw_quantity;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

/// product_assoc 中的非 BOM 关联类型
pub mod assoc_types {
    pub const MANUFACTURED_AS: &str = "MANUFACTURED_AS";
    pub const VARIANT: &str = "VARIANT";
}

/// product_feature_appl.appl_type
pub mod feature_appl_types {
    pub const STANDARD: &str = "STANDARD";
    pub const SELECTABLE: &str = "SELECTABLE";
    pub const DISTINGUISHING: &str = "DISTINGUISHING";
}

const EDGE_COLUMNS: &str = "product_id, product_id_to, assoc_type, quantity, scrap_factor, \
     sequence_num, routing_id, from_date, thru_date, estimate_calc_method";

const RULE_COLUMNS: &str = "rule_id, context_product_id, for_product_id, in_product_id, \
     substitute_product_id, feature_condition, rule_operator, quantity, rule_seq, \
     from_date, thru_date";

// ==========================================
// CatalogRepository - 产品目录仓储
// ==========================================
pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
    /// 创建新的 CatalogRepository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入（主数据维护/测试造数）
    // ==========================================

    /// 插入或覆盖产品
    pub fn upsert_product(&self, product: &Product) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO product (
                product_id, product_name, product_type, is_virtual, facility_id,
                width, height, depth
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                product.product_id,
                product.product_name,
                product.product_type.to_db_str(),
                product.is_virtual as i32,
                product.facility_id,
                product.width,
                product.height,
                product.depth,
            ],
        )?;
        Ok(())
    }

    /// 插入 BOM 边（from_date 为空时按 1970-01-01 处理）
    pub fn insert_bom_edge(&self, edge: &BomEdge) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO product_assoc (
                product_id, product_id_to, assoc_type, quantity, scrap_factor,
                sequence_num, routing_id, from_date, thru_date, estimate_calc_method
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                edge.parent_product_id,
                edge.child_product_id,
                edge.bom_type,
                edge.quantity.map(|q| q.to_string()),
                edge.scrap_factor,
                edge.sequence_num,
                edge.routing_id,
                format_datetime(edge.from_date.unwrap_or_default()),
                edge.thru_date.map(format_datetime),
                edge.estimate_calc_method,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 插入非 BOM 关联（MANUFACTURED_AS / VARIANT）
    pub fn insert_assoc(
        &self,
        product_id: &str,
        product_id_to: &str,
        assoc_type: &str,
        from_date: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO product_assoc (product_id, product_id_to, assoc_type, from_date)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![product_id, product_id_to, assoc_type, format_datetime(from_date)],
        )?;
        Ok(())
    }

    /// 插入或覆盖制造规则
    pub fn upsert_rule(&self, rule: &ManufacturingRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO manufacturing_rule (
                rule_id, context_product_id, for_product_id, in_product_id,
                substitute_product_id, feature_condition, rule_operator, quantity, rule_seq,
                from_date, thru_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                rule.rule_id,
                rule.context_product_id,
                rule.for_product_id,
                rule.in_product_id,
                rule.substitute_product_id,
                rule.feature_condition,
                rule.operator.as_ref().map(|o| o.to_db_str()),
                rule.quantity,
                rule.rule_seq,
                format_datetime(rule.from_date.unwrap_or_default()),
                rule.thru_date.map(format_datetime),
            ],
        )?;
        Ok(())
    }

    /// 登记特征并应用到产品
    pub fn apply_feature(
        &self,
        product_id: &str,
        feature: &SelectedFeature,
        appl_type: &str,
        from_date: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO product_feature (feature_id, feature_type) VALUES (?1, ?2)",
            params![feature.feature_id, feature.feature_type],
        )?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO product_feature_appl (product_id, feature_id, appl_type, from_date)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![product_id, feature.feature_id, appl_type, format_datetime(from_date)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// 登记供应商报价（supplier_pref_order = 1 为首选）
    pub fn insert_supplier_product(
        &self,
        product_id: &str,
        party_id: &str,
        supplier_pref_order: i64,
        available_from: NaiveDateTime,
        available_thru: Option<NaiveDateTime>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO supplier_product (
                product_id, party_id, supplier_pref_order, available_from_date, available_thru_date
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                product_id,
                party_id,
                supplier_pref_order,
                format_datetime(available_from),
                available_thru.map(format_datetime),
            ],
        )?;
        Ok(())
    }

    /// 插入或覆盖工厂设置（minimum_stock 为空表示该工厂不做库存管理）
    pub fn upsert_product_facility(
        &self,
        product_id: &str,
        facility_id: &str,
        lead_time_days: Option<f64>,
        minimum_stock: Option<f64>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO product_facility (product_id, facility_id, lead_time_days, minimum_stock)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![product_id, facility_id, lead_time_days, minimum_stock],
        )?;
        Ok(())
    }

    // ==========================================
    // 内部查询
    // ==========================================

    fn query_edges(
        &self,
        key_column: &str,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {EDGE_COLUMNS}
            FROM product_assoc
            WHERE {key_column} = ?1
              AND assoc_type = ?2
              AND ((?3 IS NULL AND routing_id IS NULL) OR routing_id = ?3)
              AND from_date <= ?4
              AND (thru_date IS NULL OR thru_date > ?4)
            ORDER BY sequence_num, assoc_id
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let edges = stmt
            .query_map(
                params![product_id, bom_type, routing_id, format_datetime(as_of)],
                map_edge_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// 产品上指定应用类型的有效特征
    fn query_features(
        conn: &Connection,
        product_id: &str,
        appl_type: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<SelectedFeature>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT a.feature_id, f.feature_type
            FROM product_feature_appl a
            JOIN product_feature f ON f.feature_id = a.feature_id
            WHERE a.product_id = ?1
              AND a.appl_type = ?2
              AND a.from_date <= ?3
              AND (a.thru_date IS NULL OR a.thru_date > ?3)
            ORDER BY a.feature_id
            "#,
        )?;
        let features = stmt
            .query_map(params![product_id, appl_type, format_datetime(as_of)], |row| {
                Ok(SelectedFeature::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(features)
    }
}

impl CatalogGateway for CatalogRepository {
    fn find_product(&self, product_id: &str) -> RepositoryResult<Option<Product>> {
        let conn = self.get_conn()?;
        let product = conn
            .query_row(
                r#"
                SELECT product_id, product_name, product_type, is_virtual, facility_id,
                       width, height, depth
                FROM product
                WHERE product_id = ?1
                "#,
                params![product_id],
                map_product_row,
            )
            .optional()?;
        Ok(product)
    }

    fn find_bom_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>> {
        self.query_edges("product_id", product_id, bom_type, routing_id, as_of)
    }

    fn find_parent_edges(
        &self,
        product_id: &str,
        bom_type: &str,
        routing_id: Option<&str>,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<BomEdge>> {
        self.query_edges("product_id_to", product_id, bom_type, routing_id, as_of)
    }

    fn find_manufactured_as(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let target = conn
            .query_row(
                r#"
                SELECT product_id_to
                FROM product_assoc
                WHERE product_id = ?1
                  AND assoc_type = ?2
                  AND from_date <= ?3
                  AND (thru_date IS NULL OR thru_date > ?3)
                ORDER BY from_date DESC, assoc_id DESC
                LIMIT 1
                "#,
                params![product_id, assoc_types::MANUFACTURED_AS, format_datetime(as_of)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(target)
    }

    fn find_virtual_parent(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let parent = conn
            .query_row(
                r#"
                SELECT product_id
                FROM product_assoc
                WHERE product_id_to = ?1
                  AND assoc_type = ?2
                  AND from_date <= ?3
                  AND (thru_date IS NULL OR thru_date > ?3)
                ORDER BY assoc_id
                LIMIT 1
                "#,
                params![product_id, assoc_types::VARIANT, format_datetime(as_of)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(parent)
    }

    fn find_manufacturing_rules(
        &self,
        scope: &RuleScope,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<ManufacturingRule>> {
        let (clause, mut args): (&str, Vec<String>) = match scope {
            RuleScope::Context {
                context_product_id,
                for_product_id,
                in_product_id,
            } => (
                "context_product_id = ?1 AND for_product_id = ?2 AND in_product_id = ?3",
                vec![
                    context_product_id.clone(),
                    for_product_id.clone(),
                    in_product_id.clone(),
                ],
            ),
            RuleScope::Link {
                for_product_id,
                in_product_id,
            } => (
                "context_product_id IS NULL AND for_product_id = ?1 AND in_product_id = ?2",
                vec![for_product_id.clone(), in_product_id.clone()],
            ),
            RuleScope::Node { in_product_id } => (
                "context_product_id IS NULL AND for_product_id IS NULL AND in_product_id = ?1",
                vec![in_product_id.clone()],
            ),
        };
        let as_of_idx = args.len() + 1;
        args.push(format_datetime(as_of));

        let sql = format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM manufacturing_rule
            WHERE {clause}
              AND from_date <= ?{as_of_idx}
              AND (thru_date IS NULL OR thru_date > ?{as_of_idx})
            ORDER BY rowid
            "#
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rules = stmt
            .query_map(params_from_iter(args.iter()), map_rule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    fn find_selected_features(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<Vec<SelectedFeature>> {
        let conn = self.get_conn()?;
        Self::query_features(&conn, product_id, feature_appl_types::STANDARD, as_of)
    }

    fn resolve_variant(
        &self,
        virtual_product_id: &str,
        selected_features: &[SelectedFeature],
    ) -> RepositoryResult<Vec<Product>> {
        let now = Utc::now().naive_utc();
        let candidates = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT product_id_to
                FROM product_assoc
                WHERE product_id = ?1
                  AND assoc_type = ?2
                  AND from_date <= ?3
                  AND (thru_date IS NULL OR thru_date > ?3)
                ORDER BY sequence_num, assoc_id
                "#,
            )?;
            let variant_ids = stmt
                .query_map(
                    params![virtual_product_id, assoc_types::VARIANT, format_datetime(now)],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            let mut candidates = Vec::with_capacity(variant_ids.len());
            for variant_id in variant_ids {
                let features = Self::query_features(
                    &conn,
                    &variant_id,
                    feature_appl_types::DISTINGUISHING,
                    now,
                )?;
                candidates.push((variant_id, features));
            }
            candidates
        };

        let mut products = Vec::new();
        for idx in matching_variants(&candidates, selected_features) {
            if let Some(product) = self.find_product(&candidates[idx].0)? {
                products.push(product);
            }
        }
        Ok(products)
    }

    fn has_valid_supplier_record(
        &self,
        product_id: &str,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT 1
                FROM supplier_product
                WHERE product_id = ?1
                  AND supplier_pref_order = 1
                  AND available_from_date <= ?2
                  AND (available_thru_date IS NULL OR available_thru_date > ?2)
                LIMIT 1
                "#,
                params![product_id, format_datetime(as_of)],
                |_row| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn has_stocking_facility(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT 1
                FROM product_facility
                WHERE product_id = ?1
                  AND (?2 IS NULL OR facility_id = ?2)
                  AND minimum_stock IS NOT NULL
                LIMIT 1
                "#,
                params![product_id, facility_id],
                |_row| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn facility_lead_time_days(
        &self,
        product_id: &str,
        facility_id: Option<&str>,
    ) -> RepositoryResult<Option<f64>> {
        let conn = self.get_conn()?;
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

// ==========================================
// 行映射
// ==========================================

fn map_product_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        product_id: row.get(0)?,
        product_name: row.get(1)?,
        product_type: ProductType::from_db_str(&row.get::<_, String>(2)?),
        is_virtual: row.get::<_, i64>(3)? != 0,
        facility_id: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        depth: row.get(7)?,
    })
}

fn map_edge_row(row: &Row<'_>) -> rusqlite::Result<BomEdge> {
    let raw_quantity: Option<String> = row.get(3)?;
    Ok(BomEdge {
        parent_product_id: row.get(0)?,
        child_product_id: row.get(1)?,
        bom_type: row.get(2)?,
        quantity: raw_quantity.as_deref().and_then(parse_raw_quantity),
        scrap_factor: row.get(4)?,
        sequence_num: row.get(5)?,
        routing_id: row.get(6)?,
        from_date: row.get::<_, Option<String>>(7)?.as_deref().and_then(parse_datetime),
        thru_date: row.get::<_, Option<String>>(8)?.as_deref().and_then(parse_datetime),
        estimate_calc_method: row.get(9)?,
    })
}

fn map_rule_row(row: &Row<'_>) -> rusqlite::Result<ManufacturingRule> {
    Ok(ManufacturingRule {
        rule_id: row.get(0)?,
        context_product_id: row.get(1)?,
        for_product_id: row.get(2)?,
        in_product_id: row.get(3)?,
        substitute_product_id: row.get(4)?,
        feature_condition: row.get(5)?,
        operator: row
            .get::<_, Option<String>>(6)?
            .as_deref()
            .and_then(RuleOperator::from_db_str),
        quantity: row.get(7)?,
        rule_seq: row.get(8)?,
        from_date: row.get::<_, Option<String>>(9)?.as_deref().and_then(parse_datetime),
        thru_date: row.get::<_, Option<String>>(10)?.as_deref().and_then(parse_datetime),
    })
}
