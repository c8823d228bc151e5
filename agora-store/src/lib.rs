//! Agora Storage Layer
//!
//! Provides persistence for wallets, transactions, escrows and negotiations.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Implementation for tests and the default daemon
//! - **Keyed locks**: Per-entity serialization for the engine
//! - **Retry policy**: Bounded backoff for lost optimistic races
//!
//! # Usage
//!
//! ```rust
//! use agora_store::{MemoryStore, Store};
//! use agora_domain::{Currency, Wallet};
//! use rust_decimal_macros::dec;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let wallet = Wallet::open(Uuid::now_v7(), Currency::usd(), dec!(1000), dec!(500)).unwrap();
//!     store.wallets().insert(&wallet).await.unwrap();
//!
//!     let found = store.wallets().find_by_owner(wallet.owner_id).await.unwrap();
//!     assert!(found.is_some());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod lock;
mod memory;
mod repository;
mod retry;

// Re-exports
pub use error::StoreError;
pub use lock::{KeyGuard, KeyedLocks};
pub use memory::MemoryStore;
pub use repository::{
    EscrowRepository, NegotiationRepository, Store, TransactionRepository, WalletRepository,
};
pub use retry::RetryPolicy;
