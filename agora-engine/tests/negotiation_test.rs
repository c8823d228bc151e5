//! Negotiation state machine tests through the marketplace facade.

use agora_domain::{CandidateStatus, NegotiationStatus, NotificationKind, Party, TurnPolicy};
use agora_engine::{EngineError, MarketplaceConfig, NegotiationConfig, OpenNegotiation};
use agora_testkit::{offer, offer_dated, Parties, TestMarket, WalletSeed};
use chrono::Duration;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn setup() -> anyhow::Result<(TestMarket, Parties)> {
    let market = TestMarket::new();
    let parties = market.parties(WalletSeed::funded(dec!(200000)), WalletSeed::empty()).await?;
    Ok((market, parties))
}

fn alternating() -> MarketplaceConfig {
    MarketplaceConfig {
        negotiation: NegotiationConfig {
            turn_policy: TurnPolicy::Alternating,
            ..NegotiationConfig::default()
        },
        ..MarketplaceConfig::default()
    }
}

// =============================================================================
// Open
// =============================================================================

#[tokio::test]
async fn test_open_starts_at_round_one() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let negotiation = market.open_negotiation(&parties, dec!(50000), Some(3)).await?;

    assert_eq!(negotiation.status, NegotiationStatus::Pending);
    assert_eq!(negotiation.round(), 1);
    assert_eq!(negotiation.offers().len(), 1);
    assert_eq!(negotiation.max_rounds, 3);
    assert_eq!(negotiation.current_offer().from, Party::Buyer);

    let inbox = market.events.for_user(parties.seller_id);
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Negotiation);
    Ok(())
}

#[tokio::test]
async fn test_open_uses_default_round_budget() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let negotiation = market.open_negotiation(&parties, dec!(50000), None).await?;
    assert_eq!(negotiation.max_rounds, 5);
    Ok(())
}

#[tokio::test]
async fn test_open_rejects_second_active_negotiation_for_pair() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let first = market.open_negotiation(&parties, dec!(50000), None).await?;
    let result = market.open_negotiation(&parties, dec!(45000), None).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    // A terminal negotiation frees the pair
    market.marketplace.reject_offer(first.id, parties.seller_id).await?;
    let second = market.open_negotiation(&parties, dec!(45000), None).await?;
    assert_ne!(second.id, first.id);
    Ok(())
}

#[tokio::test]
async fn test_open_validation() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    for max_rounds in [0, 21] {
        let result = market.open_negotiation(&parties, dec!(50000), Some(max_rounds)).await;
        assert!(matches!(result, Err(EngineError::Validation(_))), "max_rounds {max_rounds}");
    }

    let result = market.open_negotiation(&parties, dec!(0), None).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let backwards = market
        .marketplace
        .open_negotiation(OpenNegotiation {
            job_id: parties.job.id,
            buyer_id: parties.buyer_id,
            seller_id: parties.seller_id,
            initial_offer: offer_dated(dec!(50000), (2026, 6, 1), (2026, 3, 1)),
            max_rounds: None,
            opened_by: Party::Buyer,
        })
        .await;
    assert!(matches!(backwards, Err(EngineError::Validation(_))));

    let stranger = Parties {
        buyer_id: Uuid::now_v7(),
        ..parties.clone()
    };
    let result = market.open_negotiation(&stranger, dec!(50000), None).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    assert_eq!(market.store.negotiation_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_open_unknown_or_overdue_job() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let unknown = Parties {
        job: agora_domain::Job {
            id: Uuid::now_v7(),
            ..parties.job.clone()
        },
        ..parties.clone()
    };
    let result = market.open_negotiation(&unknown, dec!(50000), None).await;
    assert!(matches!(result, Err(EngineError::NotFound { .. })));

    market.clock.advance(Duration::days(31));
    let result = market.open_negotiation(&parties, dec!(50000), None).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    Ok(())
}

// =============================================================================
// Counter-offers
// =============================================================================

#[tokio::test]
async fn test_round_limit() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), Some(5)).await?;

    let prices = [dec!(55000), dec!(45000), dec!(52000), dec!(48000)];
    let actors = [parties.seller_id, parties.buyer_id, parties.seller_id, parties.buyer_id];
    for (price, actor) in prices.into_iter().zip(actors) {
        market.marketplace.submit_counter_offer(negotiation.id, offer(price), actor).await?;
    }

    let full = market.marketplace.get_negotiation(negotiation.id).await?;
    assert_eq!(full.round(), 5);
    assert_eq!(full.offers().len(), 5);
    assert_eq!(full.current_offer().price.as_decimal(), dec!(48000));

    let result = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(50000)), parties.seller_id)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::RoundLimitExceeded { round: 5, max_rounds: 5 })
    ));
    assert_eq!(market.marketplace.get_negotiation(negotiation.id).await?, full);

    // Still acceptable at the round limit
    let (accepted, _) = market.marketplace.accept_offer(negotiation.id, parties.seller_id).await?;
    assert_eq!(accepted.status, NegotiationStatus::Accepted);
    Ok(())
}

#[tokio::test]
async fn test_counter_offer_keeps_append_order() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;

    // Clock moves backwards between offers; order must follow appends
    market.clock.advance(Duration::hours(2));
    market.marketplace.submit_counter_offer(negotiation.id, offer(dec!(55000)), parties.seller_id).await?;
    market.clock.advance(Duration::hours(-1));
    let updated = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(47000)), parties.buyer_id)
        .await?;

    let prices: Vec<_> = updated.offers().iter().map(|o| o.price.as_decimal()).collect();
    assert_eq!(prices, vec![dec!(40000), dec!(55000), dec!(47000)]);
    assert_eq!(updated.current_offer().price.as_decimal(), dec!(47000));
    assert_eq!(updated.current_offer().from, Party::Buyer);
    Ok(())
}

#[tokio::test]
async fn test_counter_offer_validation() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;

    let result = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(-5)), parties.seller_id)
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let result = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(45000)), Uuid::now_v7())
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    market.clock.advance(Duration::days(31));
    let result = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(45000)), parties.seller_id)
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    assert_eq!(market.marketplace.get_negotiation(negotiation.id).await?.round(), 1);
    Ok(())
}

#[tokio::test]
async fn test_counter_offer_unknown_negotiation() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let result = market
        .marketplace
        .submit_counter_offer(Uuid::now_v7(), offer(dec!(45000)), parties.seller_id)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_free_turns_allow_consecutive_offers() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;

    let updated = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(42000)), parties.buyer_id)
        .await?;
    assert_eq!(updated.round(), 2);
    Ok(())
}

#[tokio::test]
async fn test_alternating_turns() -> anyhow::Result<()> {
    let market = TestMarket::with_config(alternating());
    let parties = market.parties(WalletSeed::funded(dec!(200000)), WalletSeed::empty()).await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;

    let result = market
        .marketplace
        .submit_counter_offer(negotiation.id, offer(dec!(42000)), parties.buyer_id)
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    // The author of the current offer cannot accept it either
    let result = market.marketplace.accept_offer(negotiation.id, parties.buyer_id).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    market.marketplace.submit_counter_offer(negotiation.id, offer(dec!(55000)), parties.seller_id).await?;
    let (accepted, escrow) = market.marketplace.accept_offer(negotiation.id, parties.buyer_id).await?;
    assert_eq!(accepted.status, NegotiationStatus::Accepted);
    assert_eq!(escrow.amount.as_decimal(), dec!(55000));
    Ok(())
}

// =============================================================================
// Terminal states
// =============================================================================

#[tokio::test]
async fn test_terminal_negotiation_is_immutable() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let accepted = market.open_negotiation(&parties, dec!(40000), None).await?;
    market.marketplace.accept_offer(accepted.id, parties.seller_id).await?;

    let rejected_job = market.post_job(parties.buyer_id, dec!(60000), Duration::days(10));
    let rejected = market
        .open_negotiation(&Parties { job: rejected_job, ..parties.clone() }, dec!(40000), None)
        .await?;
    market.marketplace.reject_offer(rejected.id, parties.buyer_id).await?;

    let expired_job = market.post_job(parties.buyer_id, dec!(60000), Duration::days(10));
    let expired = market
        .open_negotiation(&Parties { job: expired_job, ..parties.clone() }, dec!(40000), None)
        .await?;
    market.marketplace.expire_negotiation(expired.id).await?;

    for id in [accepted.id, rejected.id, expired.id] {
        let before = market.marketplace.get_negotiation(id).await?;
        assert!(before.status.is_terminal());

        let counter = market.marketplace.submit_counter_offer(id, offer(dec!(41000)), parties.seller_id).await;
        assert!(matches!(counter, Err(EngineError::State(_))));
        let accept = market.marketplace.accept_offer(id, parties.seller_id).await;
        assert!(matches!(accept, Err(EngineError::State(_))));
        let reject = market.marketplace.reject_offer(id, parties.seller_id).await;
        assert!(matches!(reject, Err(EngineError::State(_))));

        assert_eq!(market.marketplace.get_negotiation(id).await?, before);
    }

    assert_eq!(market.store.escrow_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_reject_notifies_counterparty_and_moves_no_funds() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;
    let transactions = market.store.transaction_count();

    let rejected = market.marketplace.reject_offer(negotiation.id, parties.seller_id).await?;

    assert_eq!(rejected.status, NegotiationStatus::Rejected);
    assert!(rejected.resolved_at.is_some());
    assert_eq!(market.store.transaction_count(), transactions);
    assert!(market
        .events
        .for_user(parties.buyer_id)
        .iter()
        .any(|n| n.title == "Offer rejected"));

    let result = market.marketplace.reject_offer(Uuid::now_v7(), parties.seller_id).await;
    assert!(matches!(result, Err(EngineError::NotFound { .. })));
    Ok(())
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn test_expire_is_idempotent() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;

    let expired = market.marketplace.expire_negotiation(negotiation.id).await?;
    assert_eq!(expired.status, NegotiationStatus::Expired);

    let again = market.marketplace.expire_negotiation(negotiation.id).await?;
    assert_eq!(again, expired);

    let deadline_notices = market
        .events
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Deadline)
        .count();
    assert_eq!(deadline_notices, 2);
    Ok(())
}

#[tokio::test]
async fn test_expire_never_touches_accepted() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let negotiation = market.open_negotiation(&parties, dec!(40000), None).await?;
    let (accepted, _) = market.marketplace.accept_offer(negotiation.id, parties.seller_id).await?;

    let after = market.marketplace.expire_negotiation(negotiation.id).await?;
    assert_eq!(after, accepted);
    Ok(())
}

#[tokio::test]
async fn test_expire_overdue_sweeps_once() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let overdue = market.open_negotiation(&parties, dec!(40000), None).await?;

    let later_job = market.post_job(parties.buyer_id, dec!(60000), Duration::days(60));
    let on_time = market
        .open_negotiation(&Parties { job: later_job, ..parties.clone() }, dec!(40000), None)
        .await?;

    assert!(market.marketplace.expire_overdue().await?.is_empty());

    market.clock.advance(Duration::days(31));
    let swept = market.marketplace.expire_overdue().await?;
    assert_eq!(swept, vec![overdue.id]);
    assert!(market.marketplace.expire_overdue().await?.is_empty());

    assert_eq!(
        market.marketplace.get_negotiation(overdue.id).await?.status,
        NegotiationStatus::Expired
    );
    assert_eq!(
        market.marketplace.get_negotiation(on_time.id).await?.status,
        NegotiationStatus::Pending
    );
    Ok(())
}

#[tokio::test]
async fn test_expire_overdue_skips_unreachable_job() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;
    let overdue = market.open_negotiation(&parties, dec!(40000), None).await?;

    let stuck_job = market.post_job(parties.buyer_id, dec!(60000), Duration::days(10));
    let stuck = market
        .open_negotiation(&Parties { job: stuck_job.clone(), ..parties.clone() }, dec!(40000), None)
        .await?;
    market.jobs.set_lookup_failing(stuck_job.id, true);

    market.clock.advance(Duration::days(31));
    let swept = market.marketplace.expire_overdue().await?;
    assert_eq!(swept, vec![overdue.id]);
    assert_eq!(market.marketplace.get_negotiation(stuck.id).await?.status, NegotiationStatus::Pending);

    market.jobs.set_lookup_failing(stuck_job.id, false);
    assert_eq!(market.marketplace.expire_overdue().await?, vec![stuck.id]);
    Ok(())
}

// =============================================================================
// Candidate view
// =============================================================================

#[tokio::test]
async fn test_candidates_follow_negotiation_status() -> anyhow::Result<()> {
    let (market, parties) = setup().await?;

    let other_seller = Uuid::now_v7();
    market.seed_wallet(other_seller, WalletSeed::empty()).await?;
    let other = Parties {
        seller_id: other_seller,
        ..parties.clone()
    };

    let first = market.open_negotiation(&parties, dec!(40000), None).await?;
    market.clock.advance(Duration::minutes(1));
    let second = market.open_negotiation(&other, dec!(38000), None).await?;
    market.marketplace.submit_counter_offer(second.id, offer(dec!(43000)), other_seller).await?;

    let rows = market.marketplace.candidates(parties.job.id).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, CandidateStatus::Pending);
    assert_eq!(rows[1].status, CandidateStatus::Negotiating);
    assert_eq!(rows[1].current_price, dec!(43000));
    assert_eq!(rows[1].round, 2);

    market.marketplace.accept_offer(first.id, parties.seller_id).await?;
    market.marketplace.reject_offer(second.id, parties.buyer_id).await?;

    let rows = market.marketplace.candidates(parties.job.id).await?;
    assert_eq!(rows[0].status, CandidateStatus::Accepted);
    assert_eq!(rows[1].status, CandidateStatus::Rejected);
    Ok(())
}
