// ==========================================
// BOM 引擎 - BOM 树
// ==========================================
// 职责: 树构建（根产品解析 + 遍历模式）与整树操作
//       展平/数量传递、同产品汇总、配置完整性检查、制造判定
// 生命周期: 每次请求新建，构建后只重算派生字段（数量/层级），不改变形状
// ==========================================

mod core;
mod loader;
mod manufacturing;
mod quantity;

#[cfg(test)]
mod tests;

pub use core::{BomTree, BomTreeRequest};
