use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Flight, ReservationQuote, ReservationView, User};

/// Store adapter contract: parameterized query primitives plus explicit
/// transaction control over one connection.
///
/// Each session owns exactly one `StoreConn`. Implementations must give a
/// transaction opened by [`begin`](StoreConn::begin) isolation strong enough
/// that a check-then-act span (capacity probe before insert, balance read
/// before debit) cannot interleave with a concurrent writer.
#[async_trait]
pub trait StoreConn: Send {
    /// Open a transaction, suspending autocommit until `commit` or
    /// `rollback`. Fails if a transaction is already open.
    async fn begin(&mut self) -> Result<(), StoreError>;
    async fn commit(&mut self) -> Result<(), StoreError>;
    async fn rollback(&mut self) -> Result<(), StoreError>;
    /// True while a transaction opened by `begin` has not been resolved.
    fn in_transaction(&self) -> bool;

    /// Look a user up by case-insensitive username.
    async fn find_user(&mut self, username: &str) -> Result<Option<User>, StoreError>;
    async fn insert_user(
        &mut self,
        username: &str,
        digest: &[u8],
        balance: i64,
    ) -> Result<(), StoreError>;
    async fn set_balance(&mut self, username: &str, balance: i64) -> Result<(), StoreError>;

    /// Non-canceled direct flights for origin/destination/day, ordered by
    /// duration then fid, at most `limit` rows.
    async fn direct_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<Flight>, StoreError>;

    /// Non-canceled two-leg itineraries sharing `day` where the first leg
    /// lands in the second leg's origin, ordered by combined duration then
    /// both fids, at most `limit` rows.
    async fn connecting_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<(Flight, Flight)>, StoreError>;

    /// Whether the user already holds a non-cancelled reservation with a leg
    /// departing on `day`.
    async fn has_reservation_on_day(
        &mut self,
        username: &str,
        day: i32,
    ) -> Result<bool, StoreError>;

    /// Count of non-cancelled reservations referencing `fid` on either leg.
    async fn seats_taken(&mut self, fid: i64) -> Result<i64, StoreError>;
    async fn seat_capacity(&mut self, fid: i64) -> Result<Option<i32>, StoreError>;

    /// Insert a fresh unpaid, uncancelled reservation and return the rid the
    /// store assigned to it.
    async fn insert_reservation(
        &mut self,
        username: &str,
        fid1: i64,
        fid2: Option<i64>,
    ) -> Result<i64, StoreError>;

    /// Settlement view of an unpaid, uncancelled reservation owned by the
    /// user, or `None` if no such reservation exists.
    async fn unpaid_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError>;

    /// Settlement view of an uncancelled reservation owned by the user,
    /// paid or not.
    async fn active_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError>;

    async fn mark_paid(&mut self, rid: i64) -> Result<(), StoreError>;
    async fn mark_cancelled(&mut self, rid: i64) -> Result<(), StoreError>;

    /// The user's non-cancelled reservations with both legs resolved,
    /// ordered by rid.
    async fn reservations_for(
        &mut self,
        username: &str,
    ) -> Result<Vec<ReservationView>, StoreError>;
}
