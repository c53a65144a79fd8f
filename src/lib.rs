pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod ledger;
pub mod market;
pub mod recorder;
pub mod shard;
pub mod strategy;

pub use config::Config;
pub use datasource::{DataSourceError, HyperliquidInfoSource, InfoSource, MockInfoSource};
pub use domain::{
    AccountState, BookSnapshot, ClientOrderId, Coin, DesiredOrder, ExchangeOrderId, Fill, Order,
    OrderStatus, PriceLevel, Side, StrategyDecision, TimeInForce, TimeMs,
};
pub use engine::{Engine, EngineConfig, ShutdownReport, TickReport};
pub use error::EngineError;
pub use execution::{
    BackendMode, ExecutionBackend, ExecutionError, LiveBackend, PaperBackend, PaperConfig, PlaceAck,
};
pub use feed::{MarketDataWriter, UserEventWriter};
pub use ledger::{LedgerError, OrderLedger};
pub use market::SnapshotStore;
pub use recorder::{ChannelRecorder, NullRecorder, RecorderSink};
pub use strategy::{MonitorStrategy, Strategy};
