use skybook_core::error::{GuardError, StoreError};
use skybook_core::identity::CredentialVerifier;
use skybook_core::store::StoreConn;

use crate::guard::TxUnit;
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error("Cannot book reservations, not logged in")]
    NotLoggedIn,
    #[error("No such itinerary {0}")]
    NoSuchItinerary(i64),
    #[error("You cannot book two flights in the same day")]
    DayConflict,
    #[error("Booking failed")]
    CapacityExceeded,
    #[error("Booking failed")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Guard(#[from] GuardError),
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    /// Book the cached itinerary at `itinerary_id`. The day-conflict and
    /// capacity checks and the insert run in one transactional unit, so a
    /// failure at any step leaves no reservation row behind.
    pub async fn book(&mut self, itinerary_id: i64) -> String {
        match self.try_book(itinerary_id).await {
            Ok(rid) => format!("Booked flight(s), reservation ID: {}\n", rid),
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_book(&mut self, itinerary_id: i64) -> Result<i64, BookError> {
        let user = self.user.clone().ok_or(BookError::NotLoggedIn)?;
        let itinerary = usize::try_from(itinerary_id)
            .ok()
            .and_then(|i| self.itineraries.get(i))
            .ok_or(BookError::NoSuchItinerary(itinerary_id))?;
        let day = itinerary.day;
        let fid1 = itinerary.fid1();
        let fid2 = itinerary.fid2();

        let mut unit = TxUnit::begin(&mut self.conn).await?;
        let outcome = book_in_unit(unit.conn(), &user, day, fid1, fid2).await;
        let rid = unit.finish(outcome).await?;
        tracing::info!(rid, user = %user, fid1, "reservation created");
        Ok(rid)
    }
}

async fn book_in_unit<C: StoreConn>(
    conn: &mut C,
    user: &str,
    day: i32,
    fid1: i64,
    fid2: Option<i64>,
) -> Result<i64, BookError> {
    if conn.has_reservation_on_day(user, day).await? {
        return Err(BookError::DayConflict);
    }
    ensure_open_seat(conn, fid1).await?;
    if let Some(second) = fid2 {
        ensure_open_seat(conn, second).await?;
    }
    let rid = conn.insert_reservation(user, fid1, fid2).await?;
    Ok(rid)
}

async fn ensure_open_seat<C: StoreConn>(conn: &mut C, fid: i64) -> Result<(), BookError> {
    let capacity = conn
        .seat_capacity(fid)
        .await?
        .ok_or_else(|| BookError::Store(StoreError::Query(format!("flight {} not found", fid))))?;
    // Cancelled reservations release their seats; only live ones count.
    let taken = conn.seats_taken(fid).await?;
    if capacity <= 0 || taken >= capacity as i64 {
        return Err(BookError::CapacityExceeded);
    }
    Ok(())
}
