use skybook_core::error::{GuardError, StoreError};
use skybook_core::identity::CredentialVerifier;
use skybook_core::store::StoreConn;

use crate::guard::TxUnit;
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum PayError {
    #[error("Cannot pay, not logged in")]
    NotLoggedIn,
    /// Covers unknown rid, wrong owner, already paid, and already cancelled
    /// uniformly.
    #[error("Cannot find unpaid reservation {rid} under user: {username}")]
    NotFound { rid: i64, username: String },
    #[error("User has only {balance} in account but itinerary costs {cost}")]
    InsufficientBalance { balance: i64, cost: i64 },
    #[error("payment failed: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Guard(#[from] GuardError),
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    /// Settle an unpaid reservation: flip `paid` and debit the balance as
    /// one unit. Returns the remaining balance on success.
    pub async fn pay(&mut self, reservation_id: i64) -> String {
        match self.try_pay(reservation_id).await {
            Ok(remaining) => format!(
                "Paid reservation: {} remaining balance: {}\n",
                reservation_id, remaining
            ),
            Err(PayError::Store(_)) => format!("Failed to pay for reservation {}\n", reservation_id),
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_pay(&mut self, reservation_id: i64) -> Result<i64, PayError> {
        let user = self.user.clone().ok_or(PayError::NotLoggedIn)?;

        // The lookup shares the unit with the writes so the balance cannot
        // move between the check and the debit.
        let mut unit = TxUnit::begin(&mut self.conn).await?;
        let outcome = pay_in_unit(unit.conn(), &user, reservation_id).await;
        let remaining = unit.finish(outcome).await?;
        tracing::info!(rid = reservation_id, user = %user, remaining, "reservation paid");
        Ok(remaining)
    }
}

async fn pay_in_unit<C: StoreConn>(
    conn: &mut C,
    user: &str,
    rid: i64,
) -> Result<i64, PayError> {
    let quote = conn
        .unpaid_reservation(user, rid)
        .await?
        .ok_or_else(|| PayError::NotFound {
            rid,
            username: user.to_string(),
        })?;
    if quote.total_price > quote.balance {
        return Err(PayError::InsufficientBalance {
            balance: quote.balance,
            cost: quote.total_price,
        });
    }
    conn.mark_paid(rid).await?;
    let remaining = quote.balance - quote.total_price;
    conn.set_balance(user, remaining).await?;
    Ok(remaining)
}
