// ==========================================
// BOM 引擎 - 性能统计
// ==========================================
// - SQLite trace/profile 回调: 统计语句数，记录慢查询
// - PerfGuard: 按服务操作输出耗时、SQL 数、慢 SQL 数
// 开关:
// - BOM_ENGINE_PERF_SQL=1 强制开启（Debug 默认开启，Release 默认关闭）
// - BOM_ENGINE_SLOW_SQL_MS=50 慢 SQL 阈值（毫秒）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SQL_TRACING: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // 只在 PerfGuard 存活期间计数
    static ACTIVE_GUARDS: Cell<u32> = Cell::new(0);
    static SQL_STATEMENTS: Cell<u64> = Cell::new(0);
    static SLOW_STATEMENTS: Cell<u64> = Cell::new(0);
}

fn env_flag(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    Some(matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    ))
}

fn guard_active() -> bool {
    ACTIVE_GUARDS.with(|g| g.get() > 0)
}

fn bump(counter: &'static std::thread::LocalKey<Cell<u64>>) {
    counter.with(|c| c.set(c.get().saturating_add(1)));
}

/// 在连接上安装语句统计回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = env_flag("BOM_ENGINE_PERF_SQL").unwrap_or(cfg!(debug_assertions));
    SQL_TRACING.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("BOM_ENGINE_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(on_sql_trace));
    conn.profile(Some(on_sql_profile));
}

fn on_sql_trace(_sql: &str) {
    if SQL_TRACING.load(Ordering::Relaxed) && guard_active() {
        bump(&SQL_STATEMENTS);
    }
}

fn on_sql_profile(sql: &str, duration: Duration) {
    if !SQL_TRACING.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }

    let mut sql_short: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some((idx, _)) = sql_short.char_indices().nth(400) {
        sql_short.truncate(idx);
        sql_short.push('…');
    }
    tracing::warn!(target: "slow_sql", duration_ms = ms, sql = %sql_short, "慢 SQL");

    if guard_active() {
        bump(&SLOW_STATEMENTS);
    }
}

/// 操作级性能统计
///
/// ```ignore
/// let _perf = bom_engine::perf::PerfGuard::new("bom_service.build_tree");
/// ```
pub struct PerfGuard {
    op: &'static str,
    started: Instant,
    sql_before: u64,
    slow_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        ACTIVE_GUARDS.with(|g| g.set(g.get().saturating_add(1)));
        Self {
            op,
            started: Instant::now(),
            sql_before: SQL_STATEMENTS.with(|c| c.get()),
            slow_before: SLOW_STATEMENTS.with(|c| c.get()),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let sql_count = SQL_STATEMENTS.with(|c| c.get()).saturating_sub(self.sql_before);
        let slow_sql_count = SLOW_STATEMENTS.with(|c| c.get()).saturating_sub(self.slow_before);

        tracing::debug!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            sql_count,
            slow_sql_count,
            "操作完成"
        );

        ACTIVE_GUARDS.with(|g| g.set(g.get().saturating_sub(1)));
    }
}
