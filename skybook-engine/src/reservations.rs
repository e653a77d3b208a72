use std::fmt::Write as _;

use skybook_core::error::StoreError;
use skybook_core::identity::CredentialVerifier;
use skybook_core::models::ReservationView;
use skybook_core::store::StoreConn;

use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum ReservationsError {
    #[error("Cannot view reservations, not logged in")]
    NotLoggedIn,
    #[error("Failed to retrieve reservations")]
    Store(#[from] StoreError),
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    /// List the caller's non-cancelled reservations with both legs resolved.
    pub async fn reservations(&mut self) -> String {
        match self.try_reservations().await {
            Ok(views) if views.is_empty() => "No reservations found\n".to_string(),
            Ok(views) => {
                let mut out = String::new();
                for view in &views {
                    let _ = write!(out, "{}", view);
                }
                out
            }
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_reservations(&mut self) -> Result<Vec<ReservationView>, ReservationsError> {
        let user = self.user.clone().ok_or(ReservationsError::NotLoggedIn)?;
        Ok(self.conn.reservations_for(&user).await?)
    }
}
