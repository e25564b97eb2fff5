mod common;

use shopkeep::error::ShopError;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_never_oversell() {
    let (engine, _) = common::engine_with(&common::catalog()).await;
    let engine = Arc::new(engine);

    // Product 2 has 4 units; 3 + 3 cannot both fit.
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.add_to_cart(1, 2, 3).await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.add_to_cart(2, 2, 3).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ShopError::InsufficientStock {
            available: 1,
            ..
        })
    )));

    assert_eq!(common::stock_of(&engine, 2).await, 1);
    assert_eq!(common::accounted_units(&engine, 2, &[1, 2]).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_single_unit_adds_drain_stock_exactly() {
    let (engine, _) = common::engine_with(&common::catalog()).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for user in 1..=20u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.add_to_cart(user, 1, 1).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ShopError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 12);
    assert_eq!(common::stock_of(&engine, 1).await, 0);
    let users: Vec<u32> = (1..=20).collect();
    assert_eq!(common::accounted_units(&engine, 1, &users).await, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_and_removals_conserve_units() {
    let (engine, _) = common::engine_with(&common::catalog()).await;
    let engine = Arc::new(engine);

    engine.add_to_cart(1, 1, 5).await.unwrap();
    engine.add_to_cart(2, 1, 5).await.unwrap();

    let purchase = tokio::spawn({
        let engine = engine.clone();
        async move { engine.complete_purchase(1).await }
    });
    let removal = tokio::spawn({
        let engine = engine.clone();
        async move { engine.remove_from_cart(2, 1, 2).await }
    });

    purchase.await.unwrap().unwrap();
    removal.await.unwrap().unwrap();

    assert_eq!(common::stock_of(&engine, 1).await, 4);
    assert_eq!(common::accounted_units(&engine, 1, &[1, 2]).await, 12);
}
