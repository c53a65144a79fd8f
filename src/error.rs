use crate::config::ConfigError;
use crate::execution::ExecutionError;
use crate::ledger::LedgerError;
use thiserror::Error;

/// Errors that stop the engine.
///
/// Action-level failures are absorbed at the tick boundary and never reach
/// this type; a ledger error here means local state can no longer be trusted.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Ledger invariant violated: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}
