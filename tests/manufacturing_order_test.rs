// ==========================================
// 制造订单级联测试
// ==========================================
// 测试目标: 验证后序建单、开工日期推导、前置关系与履约关联
// ==========================================

mod test_helpers;

use bom_engine::config::BomEngineConfig;
use bom_engine::domain::{bom_types, Product, SourceOrderLine, TraversalMode};
use bom_engine::engine::{BomTree, BomTreeRequest, ManufacturingOrderCascade, ManufacturingOrderRequest};
use bom_engine::repository::{InMemoryCatalog, InMemoryOrderGateway};
use chrono::Duration;
use test_helpers::{as_of, assert_close, edge};

/// B -(2)-> C -(5)-> RM，B/C 均为自制件
fn two_level_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_product(Product::new("B").with_facility("PLANT-1"))
        .add_product(Product::new("C"))
        .add_product(Product::new("RM"))
        .add_edge(edge("B", "C", 2.0))
        .add_edge(edge("C", "RM", 5.0));
    catalog
}

fn manufacturing_tree(catalog: &InMemoryCatalog, product_id: &str, quantity: f64) -> BomTree {
    let request = BomTreeRequest::new(
        product_id,
        bom_types::MANUF_COMPONENT,
        TraversalMode::ExplosionManufacturing,
    )
    .with_as_of(as_of());
    let mut tree = BomTree::build(request, catalog, &BomEngineConfig::default()).unwrap();
    tree.set_root_quantity(quantity);
    tree
}

#[test]
fn test_child_order_created_before_parent() {
    bom_engine::logging::init_test();
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new()
        .with_lead_time("C", 3.0)
        .with_lead_time("B", 1.0);
    let mut tree = manufacturing_tree(&catalog, "B", 4.0);

    let cascade = ManufacturingOrderCascade::new(&catalog, &orders);
    let outcome = cascade
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();

    let recorded = orders.orders();
    let products: Vec<&str> = recorded.iter().map(|o| o.request.product_id.as_str()).collect();
    assert_eq!(products, vec!["C", "B"]);

    let c_order = &recorded[0];
    let b_order = &recorded[1];
    assert_eq!(c_order.request.start_date, as_of());
    assert_close(c_order.request.quantity, 8.0);
    assert!(b_order.request.start_date >= c_order.estimated_completion);
    assert_eq!(b_order.request.start_date, as_of() + Duration::days(3));
    assert_eq!(b_order.request.facility_id.as_deref(), Some("PLANT-1"));

    assert_eq!(
        orders.precedences(),
        vec![(c_order.order_id.clone(), b_order.order_id.clone(), as_of())]
    );
    assert_eq!(outcome.order_id.as_deref(), Some(b_order.order_id.as_str()));
    assert_eq!(outcome.estimated_completion, Some(as_of() + Duration::days(4)));
}

#[test]
fn test_supplier_record_means_not_manufactured() {
    let mut catalog = two_level_catalog();
    catalog.add_supplier_record("C");
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    let c = tree.root_node().resolved_children().next().unwrap();
    assert!(tree.node(c).has_resolved_children());
    assert!(!tree.is_manufactured(c, false, &catalog).unwrap());

    ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();
    let products: Vec<String> = orders
        .orders()
        .into_iter()
        .map(|o| o.request.product_id)
        .collect();
    assert_eq!(products, vec!["B".to_string()]);
    assert!(orders.precedences().is_empty());
}

#[test]
fn test_root_ignores_its_own_supplier_record() {
    let mut catalog = two_level_catalog();
    catalog.add_supplier_record("B");
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    let outcome = ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();
    assert!(outcome.order_id.is_some());
    assert!(orders.order_for_product("B").is_some());
}

#[test]
fn test_leaf_root_creates_nothing() {
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "RM", 1.0);

    let outcome = ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();
    assert_eq!(outcome.order_id, None);
    assert_eq!(outcome.estimated_completion, None);
    assert!(orders.orders().is_empty());
}

#[test]
fn test_failed_child_order_does_not_abort_cascade() {
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new().fail_for("C");
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    let outcome = ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();

    assert!(outcome.order_id.is_some());
    assert!(orders.order_for_product("C").is_none());
    // 子订单失败时父订单按请求日期开工，且没有前置关系
    assert_eq!(orders.order_for_product("B").unwrap().request.start_date, as_of());
    assert!(orders.precedences().is_empty());
}

#[test]
fn test_fulfillment_and_name_only_on_root() {
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    let request = ManufacturingOrderRequest::new(as_of())
        .with_facility("PLANT-9")
        .with_name("客户订单")
        .with_description("急单")
        .with_source_order(SourceOrderLine::new("SO-1", "00001"));
    let outcome = ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &request)
        .unwrap();

    let root_order = orders.order_for_product("B").unwrap();
    assert_eq!(root_order.request.order_name.as_deref(), Some("客户订单"));
    assert_eq!(root_order.request.description.as_deref(), Some("急单"));
    assert_eq!(root_order.request.facility_id.as_deref(), Some("PLANT-9"));

    let child_order = orders.order_for_product("C").unwrap();
    assert_eq!(child_order.request.order_name, None);
    assert_eq!(child_order.request.description, None);
    assert_eq!(child_order.request.facility_id.as_deref(), Some("PLANT-9"));

    assert_eq!(
        orders.fulfillments(),
        vec![(
            outcome.order_id.unwrap(),
            "SO-1".to_string(),
            "00001".to_string()
        )]
    );
}

#[test]
fn test_shipment_order_names() {
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()).with_shipment("SH-7"))
        .unwrap();

    assert_eq!(
        orders.order_for_product("B").unwrap().request.order_name.as_deref(),
        Some("SP_SH-7_B")
    );
    assert_eq!(
        orders.order_for_product("C").unwrap().request.order_name.as_deref(),
        Some("SP_SH-7_C")
    );
}

#[test]
fn test_stocked_component_stops_manufacturing_tree() {
    let mut catalog = two_level_catalog();
    catalog.add_stocking_facility("C", "WH-1", None);
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();
    // C 由仓库管理，不再展开，也就不是自制件
    assert_eq!(orders.orders().len(), 1);
}

#[test]
fn test_cascade_propagates_quantities_itself() {
    let catalog = two_level_catalog();
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    // 先按旧数量算过一次，之后改了根数量
    tree.flatten(0, false, None).unwrap();
    tree.set_root_quantity(4.0);

    ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();

    assert_close(orders.order_for_product("B").unwrap().request.quantity, 4.0);
    assert_close(orders.order_for_product("C").unwrap().request.quantity, 8.0);
}

#[test]
fn test_lead_time_without_stocking_policy_is_still_manufactured() {
    let mut catalog = two_level_catalog();
    catalog.add_facility_lead_time("C", "PLANT-1", 2.0);
    let orders = InMemoryOrderGateway::new();
    let mut tree = manufacturing_tree(&catalog, "B", 1.0);

    let c = tree.root_node().resolved_children().next().unwrap();
    assert!(!tree.is_warehouse_managed(c, &catalog, None).unwrap());

    ManufacturingOrderCascade::new(&catalog, &orders)
        .run(&mut tree, &ManufacturingOrderRequest::new(as_of()))
        .unwrap();
    assert!(orders.order_for_product("C").is_some());
    assert_eq!(orders.orders().len(), 2);
}
