//! Inbound event plumbing.
//!
//! Market data goes through [`MarketDataWriter`] (store, then book listeners,
//! then recorder). Fills and order-state pushes go through
//! [`UserEventWriter`] into the ledger. Both live and paper fills take the
//! same path.

pub mod market;
pub mod user;

pub use market::{spawn_book_poller, BookListener, MarketDataWriter};
pub use user::UserEventWriter;
