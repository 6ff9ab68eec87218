// ==========================================
// BOM 引擎 - 用量/损耗率解析
// ==========================================
// 规则: 损耗率为带符号百分比，(-100, 100) 内转换为 1 + pct/100
//       超出范围或无法解析时按 1 处理并告警，不中止整棵树
// ==========================================

use tracing::warn;

use crate::domain::BomEdge;

/// 损耗率有效范围（开区间）
const SCRAP_PCT_LIMIT: f64 = 100.0;

/// 百分比损耗率 → 乘数
pub fn scrap_multiplier(scrap_pct: Option<f64>) -> f64 {
    let pct = match scrap_pct {
        Some(pct) => pct,
        None => return 1.0,
    };

    if pct.is_finite() && pct > -SCRAP_PCT_LIMIT && pct < SCRAP_PCT_LIMIT {
        1.0 + pct / 100.0
    } else {
        warn!(scrap_factor = pct, "损耗率超出有效范围 (-100, 100)，已忽略");
        1.0
    }
}

/// 边上的单位用量 → 乘数
pub fn quantity_multiplier(edge: &BomEdge) -> f64 {
    match edge.quantity {
        Some(qty) if qty.is_finite() => qty,
        other => {
            warn!(
                parent_product_id = %edge.parent_product_id,
                child_product_id = %edge.child_product_id,
                raw_quantity = ?other,
                "BOM 用量无法解析，按 1 处理"
            );
            1.0
        }
    }
}

/// 从原始文本解析用量（供仓储层读取 TEXT 列时使用）
pub fn parse_raw_quantity(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
