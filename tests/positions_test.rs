mod common;

use anyhow::Result;
use bursa::application::AppError;
use bursa::domain::TradeSide;
use common::{parse_date, test_service, AliceAndAcme};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_position_is_zero_without_transactions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    let position = service.get_position("alice", "ACME", None).await?;
    assert_eq!(position, Decimal::ZERO);

    Ok(())
}

#[tokio::test]
async fn test_position_is_signed_sum_of_quantities() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;
    AliceAndAcme::buy(&service, dec!(5), dec!(6.00), "2024-01-02").await?;
    AliceAndAcme::sell(&service, dec!(7), dec!(7.00), "2024-01-03").await?;

    let position = service.get_position("alice", "ACME", None).await?;
    assert_eq!(position, dec!(8));

    Ok(())
}

#[tokio::test]
async fn test_position_as_of_past_instant() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;
    AliceAndAcme::sell(&service, dec!(4), dec!(6.00), "2024-01-10").await?;

    let before = service
        .get_position("alice", "ACME", Some(parse_date("2024-01-05")))
        .await?;
    assert_eq!(before, dec!(10));

    let after = service
        .get_position("alice", "ACME", Some(parse_date("2024-01-10")))
        .await?;
    assert_eq!(after, dec!(6));

    Ok(())
}

#[tokio::test]
async fn test_fractional_shares() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(0.5), dec!(100.00), "2024-01-01").await?;
    AliceAndAcme::sell(&service, dec!(0.2), dec!(110.00), "2024-01-02").await?;

    let position = service.get_position("alice", "ACME", None).await?;
    assert_eq!(position, dec!(0.3));

    Ok(())
}

#[tokio::test]
async fn test_sell_rejects_oversell_and_leaves_ledger_unchanged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;

    let err = service
        .record_transaction(
            "alice",
            "ACME",
            TradeSide::Sell,
            dec!(11),
            dec!(7.00),
            Decimal::ZERO,
            parse_date("2024-01-02"),
        )
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientPosition {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, dec!(10));
            assert_eq!(requested, dec!(11));
        }
        other => panic!("Expected InsufficientPosition, got {other:?}"),
    }

    // Rejected transaction leaves no partial record
    let transactions = service.list_transactions("alice", Some("ACME")).await?;
    assert_eq!(transactions.len(), 1);
    assert_eq!(service.get_position("alice", "ACME", None).await?, dec!(10));

    Ok(())
}

#[tokio::test]
async fn test_sell_exact_position_is_allowed() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;
    AliceAndAcme::sell(&service, dec!(10), dec!(6.00), "2024-01-02").await?;

    assert_eq!(
        service.get_position("alice", "ACME", None).await?,
        Decimal::ZERO
    );

    Ok(())
}

#[tokio::test]
async fn test_backdated_sell_cannot_invalidate_later_history() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;
    AliceAndAcme::sell(&service, dec!(10), dec!(7.00), "2024-01-03").await?;

    // 10 shares were held on Jan 2, but they were all sold on Jan 3;
    // a backdated sell would drive the Jan 3 position negative.
    let err = service
        .record_transaction(
            "alice",
            "ACME",
            TradeSide::Sell,
            dec!(1),
            dec!(6.00),
            Decimal::ZERO,
            parse_date("2024-01-02"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPosition { .. }));

    Ok(())
}

#[tokio::test]
async fn test_same_timestamp_uses_insertion_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;

    // Buy and sell recorded at the same instant: the buy was inserted
    // first, so the sell sees it.
    AliceAndAcme::buy(&service, dec!(5), dec!(5.00), "2024-01-01").await?;
    AliceAndAcme::sell(&service, dec!(5), dec!(5.50), "2024-01-01").await?;

    assert_eq!(
        service.get_position("alice", "ACME", None).await?,
        Decimal::ZERO
    );

    Ok(())
}

#[tokio::test]
async fn test_transaction_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;
    let day = parse_date("2024-01-01");

    for (quantity, unit_price, fee) in [
        (dec!(0), dec!(5.00), dec!(0)),
        (dec!(-1), dec!(5.00), dec!(0)),
        (dec!(1), dec!(-5.00), dec!(0)),
        (dec!(1), dec!(5.00), dec!(-0.50)),
    ] {
        let err = service
            .record_transaction("alice", "ACME", TradeSide::Buy, quantity, unit_price, fee, day)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
    }

    assert!(service
        .list_transactions("alice", Some("ACME"))
        .await?
        .is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transaction_with_unknown_references() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;
    let day = parse_date("2024-01-01");

    let err = service
        .record_transaction(
            "bob",
            "ACME",
            TradeSide::Buy,
            dec!(1),
            dec!(5.00),
            Decimal::ZERO,
            day,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(_)));

    let err = service
        .record_transaction(
            "alice",
            "GHOST",
            TradeSide::Buy,
            dec!(1),
            dec!(5.00),
            Decimal::ZERO,
            day,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StockNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_positions_are_tracked_per_user() -> Result<()> {
    let (service, _temp) = test_service().await?;
    AliceAndAcme::create(&service).await?;
    service.create_user("bob".into()).await?;

    AliceAndAcme::buy(&service, dec!(10), dec!(5.00), "2024-01-01").await?;

    // Bob holds nothing, so he cannot sell alice's shares
    let err = service
        .record_transaction(
            "bob",
            "ACME",
            TradeSide::Sell,
            dec!(1),
            dec!(7.00),
            Decimal::ZERO,
            parse_date("2024-01-02"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPosition { .. }));

    assert_eq!(service.get_position("bob", "ACME", None).await?, dec!(0));
    assert_eq!(service.get_position("alice", "ACME", None).await?, dec!(10));

    Ok(())
}
