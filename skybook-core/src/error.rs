/// Failure surfaced by a store adapter. Adapters translate their driver
/// errors into this type so the engines stay free of any one backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("transaction control failed: {0}")]
    Tx(String),
}

/// Failure of the transaction guard itself. Unlike a plain store failure
/// this means the connection may hold a dangling transaction, so it is the
/// one condition that warrants operator attention.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Rollback failed, store state may be inconsistent")]
    RollbackFailed(#[source] StoreError),
    #[error("Transaction left open, store connection may be inconsistent")]
    Dangling,
}
