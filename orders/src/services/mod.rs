// marketplace_orders/src/services/mod.rs

//! Collaborators outside the order store: the bus, the wallet ledger, the
//! exchange-rate service and buyer notifications.

pub mod bus;
pub mod exchange;
pub mod notifications;
pub mod wallet;

pub use bus::{BusError, Delivery, MessageBus, Subscription};
pub use exchange::{ExchangeClient, HttpExchangeClient};
pub use wallet::{HttpWalletClient, WalletAccount, WalletClient};
