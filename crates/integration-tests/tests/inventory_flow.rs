//! Cart and order scenarios driven through the inventory engine.

#![allow(clippy::unwrap_used)]

use stockpile_core::{CartLineId, OrderId, ProductId, UserId};
use stockpile_integration_tests::{TestContext, price, qty};
use stockpile_storefront::inventory::{InventoryError, OrderItem, OrderRequest};

const ALICE: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);

fn order_of(items: &[(ProductId, i32)]) -> OrderRequest {
    OrderRequest {
        items: items
            .iter()
            .map(|&(product_id, n)| OrderItem {
                product_id,
                quantity: qty(n),
                quoted_price: None,
            })
            .collect(),
        address: "12 Harbour Road".to_string(),
        is_paid: false,
    }
}

// =============================================================================
// Reservation Tests
// =============================================================================

#[tokio::test]
async fn test_last_units_go_to_first_reserver() {
    let ctx = TestContext::new();
    let lamp = ctx.product("Desk Lamp", 4_500, 5);

    let added = ctx.engine.cart().add_item(ALICE, lamp, qty(5)).await.unwrap();
    assert_eq!(added.new_stock, 0);

    let err = ctx.engine.cart().add_item(BOB, lamp, qty(1)).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock {
            available: 0,
            requested: 1,
            held: None,
            ..
        }
    ));

    let order = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(lamp, 5)]))
        .await
        .unwrap();

    assert_eq!(order.total_price, price(22_500));
    assert_eq!(ctx.stock(lamp).await, 0);
    assert!(ctx.engine.cart().list_cart(ALICE).await.unwrap().is_empty());
    assert!(ctx.engine.cart().list_cart(BOB).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeat_add_merges_and_reports_held() {
    let ctx = TestContext::new();
    let mug = ctx.product("Mug", 1_200, 6);

    ctx.engine.cart().add_item(ALICE, mug, qty(2)).await.unwrap();
    let merged = ctx.engine.cart().add_item(ALICE, mug, qty(3)).await.unwrap();
    assert!(merged.merged);
    assert_eq!(merged.item.quantity.get(), 5);
    assert_eq!(merged.new_stock, 1);

    let err = ctx.engine.cart().add_item(ALICE, mug, qty(2)).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock {
            available: 1,
            requested: 2,
            held: Some(5),
            ..
        }
    ));

    // The rejected add changed nothing
    let cart = ctx.engine.cart().list_cart(ALICE).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity.get(), 5);
    assert_eq!(ctx.stock(mug).await, 1);
}

#[tokio::test]
async fn test_remove_and_clear_release_stock() {
    let ctx = TestContext::new();
    let pen = ctx.product("Pen", 300, 10);
    let ink = ctx.product("Ink", 800, 4);

    let pen_line = ctx.engine.cart().add_item(ALICE, pen, qty(3)).await.unwrap();
    ctx.engine.cart().add_item(ALICE, ink, qty(4)).await.unwrap();
    assert_eq!(ctx.stock(pen).await, 7);
    assert_eq!(ctx.stock(ink).await, 0);

    let removed = ctx
        .engine
        .cart()
        .remove_item(ALICE, pen_line.item.cart_line_id)
        .await
        .unwrap();
    assert_eq!(removed.new_stock, 10);

    assert_eq!(ctx.engine.cart().clear_cart(ALICE).await.unwrap(), 1);
    assert_eq!(ctx.stock(ink).await, 4);

    // Clearing twice is harmless
    assert_eq!(ctx.engine.cart().clear_cart(ALICE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cannot_touch_another_users_line() {
    let ctx = TestContext::new();
    let pen = ctx.product("Pen", 300, 10);

    let line = ctx.engine.cart().add_item(ALICE, pen, qty(2)).await.unwrap();
    let err = ctx
        .engine
        .cart()
        .remove_item(BOB, line.item.cart_line_id)
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::CartLineNotFound { .. }));
    assert_eq!(ctx.stock(pen).await, 8);

    let err = ctx
        .engine
        .cart()
        .remove_item(ALICE, CartLineId::new(9_999))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::CartLineNotFound { .. }));
}

#[tokio::test]
async fn test_inactive_product_cannot_be_reserved() {
    let ctx = TestContext::new();
    let retired = ctx.product("Retired Chair", 9_900, 3);
    ctx.store.set_product_active(retired, false).unwrap();

    let err = ctx.engine.cart().add_item(ALICE, retired, qty(1)).await.unwrap_err();
    assert!(matches!(err, InventoryError::ProductNotFound { .. }));
    assert_eq!(ctx.stock(retired).await, 3);
}

// =============================================================================
// Order Commit Tests
// =============================================================================

#[tokio::test]
async fn test_partial_order_leaves_remainder_reserved() {
    let ctx = TestContext::new();
    let tea = ctx.product("Green Tea", 650, 20);

    ctx.engine.cart().add_item(ALICE, tea, qty(8)).await.unwrap();
    let order = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 3)]))
        .await
        .unwrap();

    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity.get(), 3);
    assert_eq!(order.total_price, price(1_950));

    let cart = ctx.engine.cart().list_cart(ALICE).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity.get(), 5);

    // Ordering does not touch available stock a second time
    assert_eq!(ctx.stock(tea).await, 12);
}

#[tokio::test]
async fn test_multi_product_order_is_all_or_nothing() {
    let ctx = TestContext::new();
    let tea = ctx.product("Green Tea", 650, 20);
    let pot = ctx.product("Teapot", 3_000, 2);

    ctx.engine.cart().add_item(ALICE, tea, qty(4)).await.unwrap();
    ctx.engine.cart().add_item(ALICE, pot, qty(1)).await.unwrap();

    let err = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 4), (pot, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::LineNotFound {
            requested: 2,
            reserved: 1,
            ..
        }
    ));

    // Nothing was consumed
    assert_eq!(ctx.engine.cart().list_cart(ALICE).await.unwrap().len(), 2);
    assert!(ctx.engine.orders().list_orders(ALICE).await.unwrap().is_empty());

    let order = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 4), (pot, 1)]))
        .await
        .unwrap();
    assert_eq!(order.total_price, price(5_600));
    assert_eq!(order.lines[0].product_id, tea);
    assert_eq!(order.lines[1].product_id, pot);
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let ctx = TestContext::new();
    let tea = ctx.product("Green Tea", 650, 20);
    ctx.engine.cart().add_item(ALICE, tea, qty(4)).await.unwrap();

    ctx.store.fail_next_commit();
    let err = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 4)]))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::CommitFailed(_)));

    let cart = ctx.engine.cart().list_cart(ALICE).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity.get(), 4);
    assert_eq!(ctx.stock(tea).await, 16);

    // The next attempt goes through
    ctx.engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 4)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_order_history_and_payment() {
    let ctx = TestContext::new();
    let tea = ctx.product("Green Tea", 650, 20);

    ctx.engine.cart().add_item(ALICE, tea, qty(2)).await.unwrap();
    let first = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 1)]))
        .await
        .unwrap();
    let second = ctx
        .engine
        .orders()
        .create_order(ALICE, order_of(&[(tea, 1)]))
        .await
        .unwrap();

    let history = ctx.engine.orders().list_orders(ALICE).await.unwrap();
    let ids: Vec<OrderId> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let paid = ctx.engine.orders().mark_paid(ALICE, first.id).await.unwrap();
    assert!(paid.is_paid);

    let err = ctx.engine.orders().get_order(BOB, first.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::OrderNotFound { .. }));
}
