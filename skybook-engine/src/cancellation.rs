use skybook_core::error::{GuardError, StoreError};
use skybook_core::identity::CredentialVerifier;
use skybook_core::store::StoreConn;

use crate::guard::TxUnit;
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("Cannot cancel reservations, not logged in")]
    NotLoggedIn,
    /// Unknown rid, wrong owner, or already cancelled. Cancelling twice is
    /// a no-op failure.
    #[error("reservation not found or already cancelled")]
    NotFound,
    #[error("cancellation failed: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Guard(#[from] GuardError),
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    /// Cancel a reservation: refund the balance when it was paid and mark it
    /// terminal, as one unit.
    pub async fn cancel(&mut self, reservation_id: i64) -> String {
        match self.try_cancel(reservation_id).await {
            Ok(()) => format!("Canceled reservation {}\n", reservation_id),
            Err(CancelError::NotLoggedIn) => {
                "Cannot cancel reservations, not logged in\n".to_string()
            }
            Err(CancelError::Guard(e)) => format!("{}\n", e),
            Err(_) => format!("Failed to cancel reservation {}\n", reservation_id),
        }
    }

    pub async fn try_cancel(&mut self, reservation_id: i64) -> Result<(), CancelError> {
        let user = self.user.clone().ok_or(CancelError::NotLoggedIn)?;

        let mut unit = TxUnit::begin(&mut self.conn).await?;
        let outcome = cancel_in_unit(unit.conn(), &user, reservation_id).await;
        unit.finish(outcome).await?;
        tracing::info!(rid = reservation_id, user = %user, "reservation cancelled");
        Ok(())
    }
}

async fn cancel_in_unit<C: StoreConn>(
    conn: &mut C,
    user: &str,
    rid: i64,
) -> Result<(), CancelError> {
    let quote = conn
        .active_reservation(user, rid)
        .await?
        .ok_or(CancelError::NotFound)?;
    if quote.paid {
        conn.set_balance(user, quote.balance + quote.total_price).await?;
    }
    conn.mark_cancelled(rid).await?;
    Ok(())
}
