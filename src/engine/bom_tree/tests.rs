use super::*;
use crate::config::BomEngineConfig;
use crate::domain::{
    bom_types, BomEdge, ManufacturingRule, Product, ProductType, SelectedFeature, TraversalMode,
};
use crate::engine::error::BomError;
use crate::engine::gateway::{CustomCalcInput, CustomQuantityCalculator};
use crate::repository::memory_repo::InMemoryCatalog;
use chrono::{Duration, NaiveDate, NaiveDateTime};

// ==========================================
// 测试辅助函数
// ==========================================

fn as_of() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

fn edge(parent: &str, child: &str, quantity: f64) -> BomEdge {
    BomEdge::new(parent, child, bom_types::MANUF_COMPONENT, quantity)
}

fn request(product_id: &str, mode: TraversalMode) -> BomTreeRequest {
    BomTreeRequest::new(product_id, bom_types::MANUF_COMPONENT, mode).with_as_of(as_of())
}

fn build(catalog: &InMemoryCatalog, product_id: &str, mode: TraversalMode) -> BomTree {
    BomTree::build(request(product_id, mode), catalog, &BomEngineConfig::default()).unwrap()
}

/// 按产品 ID 取先序中的第一个节点数量
fn quantity_of(tree: &BomTree, product_id: &str) -> f64 {
    tree.preorder()
        .into_iter()
        .map(|id| tree.node(id))
        .find(|n| n.product_id() == product_id)
        .map(|n| n.quantity())
        .unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// A -(2, 损耗 10%)-> B -(3)-> C
fn chain_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A").with_type(ProductType::FinishedGood))
        .add_product(Product::new("B").with_type(ProductType::Subassembly))
        .add_product(Product::new("C").with_type(ProductType::RawMaterial))
        .add_edge(edge("A", "B", 2.0).with_scrap(10.0))
        .add_edge(edge("B", "C", 3.0));
    catalog
}

// ==========================================
// 展开与数量传递
// ==========================================

#[test]
fn test_explosion_quantities_follow_multiplier_and_scrap() {
    let catalog = chain_catalog();
    let mut tree = build(&catalog, "A", TraversalMode::Explosion);

    let flat = tree.flatten(0, false, None).unwrap();
    let products: Vec<&str> = flat.iter().map(|id| tree.node(*id).product_id()).collect();
    assert_eq!(products, vec!["A", "B", "C"]);

    assert_close(quantity_of(&tree, "A"), 1.0);
    assert_close(quantity_of(&tree, "B"), 2.2);
    assert_close(quantity_of(&tree, "C"), 6.6);

    let depths: Vec<usize> = flat.iter().map(|id| tree.node(*id).depth()).collect();
    assert_eq!(depths, vec![0, 1, 2]);
}

#[test]
fn test_root_quantity_and_initial_depth() {
    let catalog = chain_catalog();
    let mut tree = build(&catalog, "A", TraversalMode::Explosion);
    tree.set_root_quantity(10.0);

    let flat = tree.flatten(3, false, None).unwrap();
    assert_eq!(tree.node(flat[0]).depth(), 3);
    assert_close(quantity_of(&tree, "C"), 66.0);
}

#[test]
fn test_sum_quantities_merges_same_product() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("B"))
        .add_product(Product::new("C"))
        .add_edge(edge("A", "B", 2.0).with_sequence(1))
        .add_edge(edge("A", "C", 1.0).with_sequence(2))
        .add_edge(edge("C", "B", 3.0));

    let mut tree = build(&catalog, "A", TraversalMode::Explosion);
    tree.flatten(0, false, None).unwrap();
    let totals = tree.sum_quantities();

    assert_close(totals["B"], 5.0);
    assert_close(totals["C"], 1.0);
    assert_close(totals["A"], 1.0);
}

#[test]
fn test_children_follow_sequence_order() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("X"))
        .add_product(Product::new("Y"))
        .add_edge(edge("A", "Y", 1.0).with_sequence(20))
        .add_edge(edge("A", "X", 1.0).with_sequence(10));

    let tree = build(&catalog, "A", TraversalMode::Explosion);
    let children: Vec<&str> = tree
        .children(tree.root())
        .into_iter()
        .map(|n| n.product_id())
        .collect();
    assert_eq!(children, vec!["X", "Y"]);
}

#[test]
fn test_exclude_wip_prunes_subtree() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("W").with_type(ProductType::Wip))
        .add_product(Product::new("X"))
        .add_product(Product::new("B"))
        .add_edge(edge("A", "W", 1.0).with_sequence(1))
        .add_edge(edge("W", "X", 1.0))
        .add_edge(edge("A", "B", 1.0).with_sequence(2));

    let mut tree = build(&catalog, "A", TraversalMode::Explosion);
    let flat = tree.flatten(0, true, None).unwrap();
    let products: Vec<&str> = flat.iter().map(|id| tree.node(*id).product_id()).collect();
    assert_eq!(products, vec!["A", "B"]);

    let flat = tree.flatten(0, false, None).unwrap();
    assert_eq!(flat.len(), 4);
}

// ==========================================
// 自定义用量计算
// ==========================================

struct AreaCalculator;

impl CustomQuantityCalculator for AreaCalculator {
    fn calculate(&self, method: &str, input: &CustomCalcInput) -> anyhow::Result<Option<f64>> {
        match method {
            "AREA" => Ok(Some(input.needed_quantity * input.width * input.height)),
            "NOTHING" => Ok(None),
            other => anyhow::bail!("未知计算方法: {}", other),
        }
    }
}

fn calc_catalog(method: &str) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("PANEL"))
        .add_product(Product::new("SHEET").with_dimensions(2.0, 3.0, 0.0))
        .add_edge(edge("PANEL", "SHEET", 2.0).with_scrap(10.0).with_calc_method(method));
    catalog
}

#[test]
fn test_custom_calculation_overrides_formula() {
    let catalog = calc_catalog("AREA");
    let mut tree = build(&catalog, "PANEL", TraversalMode::Explosion);
    tree.flatten(0, false, Some(&AreaCalculator)).unwrap();
    // 2 × 2 × 3，不含损耗
    assert_close(quantity_of(&tree, "SHEET"), 12.0);
}

#[test]
fn test_custom_calculation_without_value_falls_back() {
    let catalog = calc_catalog("NOTHING");
    let mut tree = build(&catalog, "PANEL", TraversalMode::Explosion);
    tree.flatten(0, false, Some(&AreaCalculator)).unwrap();
    assert_close(quantity_of(&tree, "SHEET"), 2.2);

    // 未配置计算器同样沿用公式
    let mut tree = build(&catalog, "PANEL", TraversalMode::Explosion);
    tree.flatten(0, false, None).unwrap();
    assert_close(quantity_of(&tree, "SHEET"), 2.2);
}

#[test]
fn test_custom_calculation_error_aborts_flatten() {
    let catalog = calc_catalog("BROKEN");
    let mut tree = build(&catalog, "PANEL", TraversalMode::Explosion);
    let err = tree.flatten(0, false, Some(&AreaCalculator)).unwrap_err();
    assert!(matches!(err, BomError::CustomCalculation { ref method, .. } if method == "BROKEN"));
}

// ==========================================
// 根产品解析与边查找回退
// ==========================================

#[test]
fn test_routing_specific_edges_with_generic_fallback() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("B"))
        .add_product(Product::new("C"))
        .add_edge(edge("A", "B", 1.0).with_routing("R1"))
        .add_edge(edge("A", "C", 1.0));

    let config = BomEngineConfig::default();
    let tree = BomTree::build(
        request("A", TraversalMode::Explosion).with_routing("R1"),
        &catalog,
        &config,
    )
    .unwrap();
    let children: Vec<&str> = tree.children(tree.root()).iter().map(|n| n.product_id()).collect();
    assert_eq!(children, vec!["B"]);

    let tree = BomTree::build(
        request("A", TraversalMode::Explosion).with_routing("R2"),
        &catalog,
        &config,
    )
    .unwrap();
    let children: Vec<&str> = tree.children(tree.root()).iter().map(|n| n.product_id()).collect();
    assert_eq!(children, vec!["C"]);
    assert_eq!(tree.routing_id(), Some("R2"));
}

#[test]
fn test_manufactured_as_redirects_root() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("PKG"))
        .add_product(Product::new("BASE"))
        .add_product(Product::new("X"))
        .set_manufactured_as("PKG", "BASE")
        .add_edge(edge("BASE", "X", 4.0));

    let tree = build(&catalog, "PKG", TraversalMode::Explosion);
    assert_eq!(tree.requested_product_id(), "PKG");
    assert_eq!(tree.manufactured_product_id(), "BASE");
    assert_eq!(tree.root_node().product_id(), "BASE");

    let original = tree.root_node().substituted().unwrap();
    assert_eq!(tree.node(original).product_id(), "PKG");
    assert_eq!(tree.all_product_ids(), vec!["BASE".to_string(), "X".to_string()]);
}

#[test]
fn test_root_without_redirect_has_no_substitute() {
    let catalog = chain_catalog();
    let tree = build(&catalog, "A", TraversalMode::Explosion);
    assert_eq!(tree.requested_product_id(), "A");
    assert_eq!(tree.manufactured_product_id(), "A");
    assert_eq!(tree.root_node().substituted(), None);
}

#[test]
fn test_variant_without_bom_uses_virtual_product() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new_virtual("CHAIR"))
        .add_product(Product::new("CHAIR-OAK"))
        .add_product(Product::new("LEG"))
        .add_variant("CHAIR", "CHAIR-OAK", vec![])
        .add_edge(edge("CHAIR", "LEG", 4.0));

    let tree = build(&catalog, "CHAIR-OAK", TraversalMode::Explosion);
    assert_eq!(tree.root_node().product_id(), "CHAIR");
    assert_eq!(tree.children(tree.root()).len(), 1);
}

#[test]
fn test_unknown_root_product_is_error() {
    let catalog = InMemoryCatalog::new();
    let err = BomTree::build(
        request("GHOST", TraversalMode::Explosion),
        &catalog,
        &BomEngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BomError::ProductNotFound { ref product_id } if product_id == "GHOST"));
}

#[test]
fn test_missing_child_product_is_error() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_edge(edge("A", "GHOST", 1.0));

    let err = BomTree::build(
        request("A", TraversalMode::Explosion),
        &catalog,
        &BomEngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BomError::ProductNotFound { .. }));
}

#[test]
fn test_catalog_failure_aborts_build() {
    let mut catalog = chain_catalog();
    catalog.fail_for("C");

    let err = BomTree::build(
        request("A", TraversalMode::Explosion),
        &catalog,
        &BomEngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BomError::Repository(_)));
}

// ==========================================
// 遍历模式
// ==========================================

#[test]
fn test_single_level_explosion_stops_at_direct_children() {
    let catalog = chain_catalog();
    let tree = build(&catalog, "A", TraversalMode::ExplosionSingleLevel);
    assert_eq!(tree.all_product_ids(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(tree.max_depth(), 1);
}

#[test]
fn test_manufacturing_explosion_stops_at_stocked_parts() {
    let mut catalog = chain_catalog();
    catalog.add_stocking_facility("B", "WH1", None);

    let tree = build(&catalog, "A", TraversalMode::ExplosionManufacturing);
    assert_eq!(tree.all_product_ids(), vec!["A".to_string(), "B".to_string()]);

    let full = build(&catalog, "A", TraversalMode::Explosion);
    assert_eq!(full.max_depth(), 2);
}

#[test]
fn test_wip_is_never_warehouse_managed() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("W").with_type(ProductType::Wip))
        .add_product(Product::new("X"))
        .add_edge(edge("A", "W", 1.0))
        .add_edge(edge("W", "X", 1.0))
        .add_stocking_facility("W", "WH1", None);

    let tree = build(&catalog, "A", TraversalMode::ExplosionManufacturing);
    assert_eq!(tree.max_depth(), 2);
    let wip = tree.root_node().resolved_children().next().unwrap();
    assert!(!tree.is_warehouse_managed(wip, &catalog, None).unwrap());
}

#[test]
fn test_implosion_walks_parents() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("CAR"))
        .add_product(Product::new("BIKE"))
        .add_product(Product::new("BOLT"))
        .add_product(Product::new("FLEET"))
        .add_edge(edge("CAR", "BOLT", 40.0))
        .add_edge(edge("BIKE", "BOLT", 12.0))
        .add_edge(edge("FLEET", "CAR", 5.0));

    let mut tree = build(&catalog, "BOLT", TraversalMode::Implosion);
    let mut parents: Vec<&str> = tree.children(tree.root()).iter().map(|n| n.product_id()).collect();
    parents.sort();
    assert_eq!(parents, vec!["BIKE", "CAR"]);
    assert_eq!(tree.max_depth(), 2);

    // 反查不放大数量
    tree.flatten(0, false, None).unwrap();
    assert_close(quantity_of(&tree, "FLEET"), 1.0);
    assert!(tree
        .children(tree.root())
        .iter()
        .all(|n| n.edge().is_some() && n.quantity_multiplier() == 1.0));
}

// ==========================================
// 防护
// ==========================================

#[test]
fn test_cycle_is_detected() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("B"))
        .add_edge(edge("A", "B", 1.0))
        .add_edge(edge("B", "A", 1.0));

    let err = BomTree::build(
        request("A", TraversalMode::Explosion),
        &catalog,
        &BomEngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, BomError::CycleDetected { ref product_id } if product_id == "A"));
}

#[test]
fn test_depth_limit_is_enforced() {
    let catalog = chain_catalog();
    let config = BomEngineConfig {
        max_depth: 2,
        ..BomEngineConfig::default()
    };
    let err = BomTree::build(request("A", TraversalMode::Explosion), &catalog, &config)
        .unwrap_err();
    assert!(matches!(err, BomError::MaxDepthExceeded { max_depth: 2, .. }));
}

// ==========================================
// 配置器集成
// ==========================================

fn wheel_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("BIKE"))
        .add_product(Product::new_virtual("WHEEL"))
        .add_product(Product::new("WHEEL-RED"))
        .add_product(Product::new("SPOKE"))
        .add_edge(edge("BIKE", "WHEEL", 2.0).with_scrap(10.0))
        .add_edge(edge("WHEEL-RED", "SPOKE", 32.0));
    catalog
}

#[test]
fn test_unresolved_virtual_child_marks_tree_unconfigured() {
    let catalog = wheel_catalog();
    let tree = build(&catalog, "BIKE", TraversalMode::Explosion);
    assert!(!tree.is_configured());

    let unconfigured = tree.unconfigured_nodes();
    assert_eq!(unconfigured.len(), 1);
    assert_eq!(tree.node(unconfigured[0]).product_id(), "WHEEL");
}

#[test]
fn test_rule_substitution_keeps_virtual_for_traceability() {
    let mut catalog = wheel_catalog();
    catalog.add_rule(ManufacturingRule::new("R1", "WHEEL").substitute_with("WHEEL-RED"));

    let mut tree = build(&catalog, "BIKE", TraversalMode::Explosion);
    assert!(tree.is_configured());

    let wheel = tree.root_node().resolved_children().next().unwrap();
    let node = tree.node(wheel);
    assert_eq!(node.product_id(), "WHEEL-RED");
    assert_eq!(node.rule_applied().unwrap().rule_id, "R1");
    let virtual_node = tree.node(node.substituted().unwrap());
    assert_eq!(virtual_node.product_id(), "WHEEL");
    assert_eq!(virtual_node.parent(), Some(tree.root()));

    // 替换件继续展开，损耗沿用原边
    tree.flatten(0, false, None).unwrap();
    assert_close(quantity_of(&tree, "WHEEL-RED"), 2.2);
    assert_close(quantity_of(&tree, "SPOKE"), 70.4);
}

#[test]
fn test_rule_removal_leaves_empty_slot() {
    let mut catalog = wheel_catalog();
    catalog
        .add_rule(ManufacturingRule::new("R1", "WHEEL").when_feature("NO_WHEELS"))
        .add_standard_feature("BIKE", SelectedFeature::new("NO_WHEELS", "OPTION"));

    let tree = build(&catalog, "BIKE", TraversalMode::Explosion);
    assert_eq!(tree.root_node().child_slots(), &[None]);
    assert_eq!(tree.root_node().child_edges().len(), 1);
    assert!(!tree.root_node().has_resolved_children());
    assert!(tree.is_configured());
}

#[test]
fn test_explicit_features_override_standard_features() {
    let mut catalog = wheel_catalog();
    catalog
        .add_rule(ManufacturingRule::new("R1", "WHEEL").when_feature("RED").substitute_with("WHEEL-RED"))
        .add_standard_feature("BIKE", SelectedFeature::new("BLUE", "COLOR"));

    let tree = build(&catalog, "BIKE", TraversalMode::Explosion);
    assert!(!tree.is_configured());

    let tree = BomTree::build(
        request("BIKE", TraversalMode::Explosion)
            .with_features(vec![SelectedFeature::new("RED", "COLOR")]),
        &catalog,
        &BomEngineConfig::default(),
    )
    .unwrap();
    assert!(tree.is_configured());
    assert_eq!(tree.selected_features().len(), 1);
}

// ==========================================
// 制造判定与开工日期
// ==========================================

#[test]
fn test_is_manufactured_rules() {
    let mut catalog = chain_catalog();
    catalog.add_supplier_record("B");
    let tree = build(&catalog, "A", TraversalMode::Explosion);

    let b = tree.root_node().resolved_children().next().unwrap();
    let c = tree.node(b).resolved_children().next().unwrap();

    assert!(tree.is_manufactured(tree.root(), false, &catalog).unwrap());
    // 叶子永不自制
    assert!(!tree.is_manufactured(c, true, &catalog).unwrap());
    // 有供应商记录视为外购，除非忽略
    assert!(!tree.is_manufactured(b, false, &catalog).unwrap());
    assert!(tree.is_manufactured(b, true, &catalog).unwrap());
}

#[test]
fn test_start_date_backward_schedules_wip() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("W1").with_type(ProductType::Wip))
        .add_product(Product::new("W2").with_type(ProductType::Wip))
        .add_product(Product::new("RM"))
        .add_edge(edge("A", "W1", 1.0))
        .add_edge(edge("W1", "W2", 1.0))
        .add_edge(edge("W2", "RM", 1.0))
        .add_facility_lead_time("A", "F1", 5.0)
        .add_facility_lead_time("W1", "F1", 2.0)
        .add_facility_lead_time("W2", "F1", 1.0)
        .add_facility_lead_time("RM", "F1", 30.0);

    let tree = build(&catalog, "A", TraversalMode::Explosion);
    let due = as_of() + Duration::days(10);
    let w1 = tree.root_node().resolved_children().next().unwrap();

    // W1/W2 逐级倒排，原料不参与
    let start = tree.start_date(w1, &catalog, Some("F1"), due, false).unwrap();
    assert_eq!(start, due - Duration::days(3));

    let forced = tree.start_date(tree.root(), &catalog, Some("F1"), due, true).unwrap();
    assert_eq!(forced, due - Duration::days(8));
}

#[test]
fn test_start_date_of_plain_node_is_required_date() {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("A"))
        .add_product(Product::new("W1").with_type(ProductType::Wip))
        .add_product(Product::new("RM"))
        .add_edge(edge("A", "W1", 1.0))
        .add_edge(edge("W1", "RM", 1.0))
        .add_facility_lead_time("W1", "F1", 2.0);

    let tree = build(&catalog, "A", TraversalMode::Explosion);
    let due = as_of() + Duration::days(10);

    // A 不是 WIP 且未强制，不向下倒排
    let start = tree.start_date(tree.root(), &catalog, Some("F1"), due, false).unwrap();
    assert_eq!(start, due);
}

#[test]
fn test_lead_time_alone_is_not_warehouse_managed() {
    let mut catalog = chain_catalog();
    catalog.add_facility_lead_time("B", "F1", 2.0);

    let tree = build(&catalog, "A", TraversalMode::ExplosionManufacturing);
    assert_eq!(tree.max_depth(), 2);
    let b = tree.root_node().resolved_children().next().unwrap();
    assert!(!tree.is_warehouse_managed(b, &catalog, None).unwrap());
    assert!(tree.is_manufactured(b, false, &catalog).unwrap());
}
