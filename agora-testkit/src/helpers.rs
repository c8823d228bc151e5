//! Seeding helpers for marketplace tests.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use agora_domain::{Currency, Job, Negotiation, OfferDraft, UserId, Wallet};
use agora_engine::{EngineResult, OpenNegotiation};

use crate::{Result, TestMarket};

/// Offer terms with a fixed three-month period.
pub fn offer(price: Decimal) -> OfferDraft {
    offer_dated(price, (2026, 2, 15), (2026, 5, 15))
}

/// Offer terms with an explicit period.
pub fn offer_dated(price: Decimal, start: (i32, u32, u32), end: (i32, u32, u32)) -> OfferDraft {
    let date = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
    OfferDraft {
        price,
        start_date: date(start),
        end_date: date(end),
        payment_schedule: "30% upfront, 40% midpoint, 30% on delivery".to_string(),
        terms: "Standard service agreement".to_string(),
    }
}

/// Wallet state to seed.
#[derive(Debug, Clone, Copy)]
pub struct WalletSeed {
    pub balance: Decimal,
    pub daily_limit: Decimal,
    pub per_job_limit: Decimal,
    /// Spend already counted today (seeded as a prior hold)
    pub daily_spent: Decimal,
}

impl WalletSeed {
    /// The buyer wallet used throughout the settlement scenarios:
    /// balance 250000, daily limit 100000, already spent 25000, per-job 80000.
    pub fn scenario_buyer() -> Self {
        Self {
            balance: dec!(250000),
            daily_limit: dec!(100000),
            per_job_limit: dec!(80000),
            daily_spent: dec!(25000),
        }
    }

    /// An empty seller wallet.
    pub fn empty() -> Self {
        Self {
            balance: Decimal::ZERO,
            daily_limit: dec!(100000),
            per_job_limit: dec!(100000),
            daily_spent: Decimal::ZERO,
        }
    }

    /// A funded wallet with generous limits.
    pub fn funded(balance: Decimal) -> Self {
        Self {
            balance,
            daily_limit: dec!(1000000),
            per_job_limit: dec!(1000000),
            daily_spent: Decimal::ZERO,
        }
    }
}

/// Buyer, seller, their wallets and an open job.
#[derive(Debug, Clone)]
pub struct Parties {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub buyer_wallet: Wallet,
    pub seller_wallet: Wallet,
    pub job: Job,
}

impl TestMarket {
    /// Open a wallet for `owner` and bring it to the seeded state.
    ///
    /// A non-zero `daily_spent` is produced by a real hold, so the wallet's
    /// escrow balance carries the same amount and its log stays auditable.
    pub async fn seed_wallet(&self, owner: UserId, seed: WalletSeed) -> Result<Wallet> {
        let wallet = self
            .marketplace
            .open_wallet(owner, Currency::usd(), seed.daily_limit, seed.per_job_limit)
            .await?;

        let funding = seed.balance + seed.daily_spent;
        if funding > Decimal::ZERO {
            self.marketplace.deposit(wallet.id, funding, "seed-funding").await?;
        }
        if seed.daily_spent > Decimal::ZERO {
            let amount = agora_domain::Money::new(seed.daily_spent)?;
            self.marketplace.ledger().hold(wallet.id, amount, "seed-prior-spend").await?;
        }

        Ok(self.marketplace.get_wallet(wallet.id).await?)
    }

    /// Register an open job owned by `buyer_id`, due `deadline_in` from now.
    pub fn post_job(&self, buyer_id: UserId, budget: Decimal, deadline_in: Duration) -> Job {
        let now = agora_engine::Clock::now(self.clock.as_ref());
        let mut job = Job::new(buyer_id, "Cloud migration", budget, Currency::usd(), now + deadline_in);
        job.created_at = now;
        self.jobs.register(job.clone());
        job
    }

    /// Seed a buyer and a seller with wallets and an open job due in 30 days.
    pub async fn parties(&self, buyer: WalletSeed, seller: WalletSeed) -> Result<Parties> {
        let buyer_id = Uuid::now_v7();
        let seller_id = Uuid::now_v7();

        let buyer_wallet = self.seed_wallet(buyer_id, buyer).await?;
        let seller_wallet = self.seed_wallet(seller_id, seller).await?;
        let job = self.post_job(buyer_id, dec!(100000), Duration::days(30));

        Ok(Parties {
            buyer_id,
            seller_id,
            buyer_wallet,
            seller_wallet,
            job,
        })
    }

    /// Open a buyer-initiated negotiation at `price`.
    pub async fn open_negotiation(&self, parties: &Parties, price: Decimal, max_rounds: Option<u32>) -> EngineResult<Negotiation> {
        let negotiation = self
            .marketplace
            .open_negotiation(OpenNegotiation {
                job_id: parties.job.id,
                buyer_id: parties.buyer_id,
                seller_id: parties.seller_id,
                initial_offer: offer(price),
                max_rounds,
                opened_by: agora_domain::Party::Buyer,
            })
            .await?;
        Ok(negotiation)
    }
}
