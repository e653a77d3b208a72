use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use skybook_core::error::StoreError;
use skybook_core::models::{Flight, ReservationQuote, ReservationView, User};
use skybook_core::store::StoreConn;

/// In-memory store shared by any number of sessions. Used by the test
/// suites and for local development without a database.
///
/// A transactional unit holds the single state lock from `begin` until
/// `commit`/`rollback`, which serializes units completely, the same
/// guarantee the Postgres adapter gets from SERIALIZABLE. Rollback restores
/// a snapshot taken at `begin`.
#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

#[derive(Debug, Clone)]
struct MemState {
    users: HashMap<String, User>,
    flights: BTreeMap<i64, Flight>,
    reservations: BTreeMap<i64, Reservation>,
    next_rid: i64,
}

impl Default for MemState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            flights: BTreeMap::new(),
            reservations: BTreeMap::new(),
            next_rid: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct Reservation {
    rid: i64,
    username: String,
    fid1: i64,
    fid2: Option<i64>,
    paid: bool,
    cancelled: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for one session.
    pub fn session(&self) -> MemConn {
        MemConn {
            shared: Arc::clone(&self.state),
            tx: None,
        }
    }

    /// Seed a flight row. Flight data is owned by an external ingestion
    /// process in production; tests stand in for it here.
    pub async fn insert_flight(&self, flight: Flight) {
        self.state.lock().await.flights.insert(flight.fid, flight);
    }

    /// Committed balance of a user, for test assertions.
    pub async fn balance_of(&self, username: &str) -> Option<i64> {
        let state = self.state.lock().await;
        state.users.get(&username.to_lowercase()).map(|u| u.balance)
    }

    /// Committed (paid, cancelled) flags of a reservation, for test
    /// assertions.
    pub async fn reservation_flags(&self, rid: i64) -> Option<(bool, bool)> {
        let state = self.state.lock().await;
        state.reservations.get(&rid).map(|r| (r.paid, r.cancelled))
    }

    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }
}

struct OpenTx {
    live: OwnedMutexGuard<MemState>,
    snapshot: MemState,
}

/// One session's connection to a [`MemStore`].
pub struct MemConn {
    shared: Arc<Mutex<MemState>>,
    tx: Option<OpenTx>,
}

impl MemConn {
    /// Run `f` against transactional state when a unit is open, otherwise
    /// against committed state under a short-lived lock.
    async fn with_state<T>(&mut self, f: impl FnOnce(&mut MemState) -> T) -> T {
        match &mut self.tx {
            Some(tx) => f(&mut tx.live),
            None => f(&mut *self.shared.lock().await),
        }
    }
}

fn normalize(username: &str) -> String {
    username.to_lowercase()
}

impl MemState {
    fn quote_for(&self, reservation: &Reservation) -> Result<ReservationQuote, StoreError> {
        let price_of = |fid: i64| {
            self.flights
                .get(&fid)
                .map(|f| f.price)
                .ok_or_else(|| StoreError::Query(format!("flight {} not found", fid)))
        };
        let mut total = price_of(reservation.fid1)?;
        if let Some(fid2) = reservation.fid2 {
            total += price_of(fid2)?;
        }
        let balance = self
            .users
            .get(&reservation.username)
            .map(|u| u.balance)
            .ok_or_else(|| StoreError::Query(format!("user {} not found", reservation.username)))?;
        Ok(ReservationQuote {
            paid: reservation.paid,
            total_price: total,
            balance,
        })
    }

    fn find_reservation(&self, username: &str, rid: i64, unpaid_only: bool) -> Option<&Reservation> {
        let owner = normalize(username);
        self.reservations
            .get(&rid)
            .filter(|r| r.username == owner && !r.cancelled && (!unpaid_only || !r.paid))
    }
}

#[async_trait]
impl StoreConn for MemConn {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.tx.is_some() {
            return Err(StoreError::Tx("transaction already open".to_string()));
        }
        let live = Arc::clone(&self.shared).lock_owned().await;
        let snapshot = live.clone();
        self.tx = Some(OpenTx { live, snapshot });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(StoreError::Tx("no open transaction".to_string())),
        }
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(mut tx) => {
                *tx.live = tx.snapshot;
                debug!("in-memory transaction rolled back");
                Ok(())
            }
            None => Err(StoreError::Tx("no open transaction".to_string())),
        }
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn find_user(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let key = normalize(username);
        Ok(self
            .with_state(|state| state.users.get(&key).cloned())
            .await)
    }

    async fn insert_user(
        &mut self,
        username: &str,
        digest: &[u8],
        balance: i64,
    ) -> Result<(), StoreError> {
        let key = normalize(username);
        let user = User {
            username: username.to_string(),
            password_digest: digest.to_vec(),
            balance,
        };
        self.with_state(|state| {
            if state.users.contains_key(&key) {
                return Err(StoreError::Query(format!(
                    "username {} already exists",
                    username
                )));
            }
            state.users.insert(key, user);
            Ok(())
        })
        .await
    }

    async fn set_balance(&mut self, username: &str, balance: i64) -> Result<(), StoreError> {
        let key = normalize(username);
        self.with_state(|state| match state.users.get_mut(&key) {
            Some(user) => {
                user.balance = balance;
                Ok(())
            }
            None => Err(StoreError::Query(format!("user {} not found", username))),
        })
        .await
    }

    async fn direct_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<Flight>, StoreError> {
        Ok(self
            .with_state(|state| {
                let mut matches: Vec<Flight> = state
                    .flights
                    .values()
                    .filter(|f| {
                        !f.canceled
                            && f.origin_city == origin
                            && f.dest_city == dest
                            && f.day_of_month == day
                    })
                    .cloned()
                    .collect();
                matches.sort_by_key(|f| (f.duration, f.fid));
                matches.truncate(limit.max(0) as usize);
                matches
            })
            .await)
    }

    async fn connecting_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<(Flight, Flight)>, StoreError> {
        Ok(self
            .with_state(|state| {
                let mut pairs: Vec<(Flight, Flight)> = Vec::new();
                for first in state.flights.values() {
                    if first.canceled || first.origin_city != origin || first.day_of_month != day {
                        continue;
                    }
                    for second in state.flights.values() {
                        if second.canceled
                            || second.day_of_month != day
                            || second.origin_city != first.dest_city
                            || second.dest_city != dest
                        {
                            continue;
                        }
                        pairs.push((first.clone(), second.clone()));
                    }
                }
                pairs.sort_by_key(|(a, b)| (a.duration + b.duration, a.fid, b.fid));
                pairs.truncate(limit.max(0) as usize);
                pairs
            })
            .await)
    }

    async fn has_reservation_on_day(
        &mut self,
        username: &str,
        day: i32,
    ) -> Result<bool, StoreError> {
        let owner = normalize(username);
        Ok(self
            .with_state(|state| {
                state.reservations.values().any(|r| {
                    r.username == owner
                        && !r.cancelled
                        && state
                            .flights
                            .get(&r.fid1)
                            .map_or(false, |f| f.day_of_month == day)
                })
            })
            .await)
    }

    async fn seats_taken(&mut self, fid: i64) -> Result<i64, StoreError> {
        Ok(self
            .with_state(|state| {
                state
                    .reservations
                    .values()
                    .filter(|r| !r.cancelled && (r.fid1 == fid || r.fid2 == Some(fid)))
                    .count() as i64
            })
            .await)
    }

    async fn seat_capacity(&mut self, fid: i64) -> Result<Option<i32>, StoreError> {
        Ok(self
            .with_state(|state| state.flights.get(&fid).map(|f| f.capacity))
            .await)
    }

    async fn insert_reservation(
        &mut self,
        username: &str,
        fid1: i64,
        fid2: Option<i64>,
    ) -> Result<i64, StoreError> {
        let owner = normalize(username);
        Ok(self
            .with_state(|state| {
                let rid = state.next_rid;
                state.next_rid += 1;
                state.reservations.insert(
                    rid,
                    Reservation {
                        rid,
                        username: owner,
                        fid1,
                        fid2,
                        paid: false,
                        cancelled: false,
                    },
                );
                rid
            })
            .await)
    }

    async fn unpaid_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError> {
        self.with_state(|state| {
            state
                .find_reservation(username, rid, true)
                .map(|r| state.quote_for(r))
                .transpose()
        })
        .await
    }

    async fn active_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError> {
        self.with_state(|state| {
            state
                .find_reservation(username, rid, false)
                .map(|r| state.quote_for(r))
                .transpose()
        })
        .await
    }

    async fn mark_paid(&mut self, rid: i64) -> Result<(), StoreError> {
        self.with_state(|state| match state.reservations.get_mut(&rid) {
            Some(r) if !r.paid => {
                r.paid = true;
                Ok(())
            }
            _ => Err(StoreError::Query(format!("reservation {} not payable", rid))),
        })
        .await
    }

    async fn mark_cancelled(&mut self, rid: i64) -> Result<(), StoreError> {
        self.with_state(|state| match state.reservations.get_mut(&rid) {
            Some(r) if !r.cancelled => {
                r.cancelled = true;
                Ok(())
            }
            _ => Err(StoreError::Query(format!(
                "reservation {} not cancellable",
                rid
            ))),
        })
        .await
    }

    async fn reservations_for(
        &mut self,
        username: &str,
    ) -> Result<Vec<ReservationView>, StoreError> {
        let owner = normalize(username);
        self.with_state(|state| {
            let mut views = Vec::new();
            for r in state.reservations.values() {
                if r.username != owner || r.cancelled {
                    continue;
                }
                let outbound = state
                    .flights
                    .get(&r.fid1)
                    .cloned()
                    .ok_or_else(|| StoreError::Query(format!("flight {} not found", r.fid1)))?;
                let connection = match r.fid2 {
                    Some(fid2) => Some(state.flights.get(&fid2).cloned().ok_or_else(|| {
                        StoreError::Query(format!("flight {} not found", fid2))
                    })?),
                    None => None,
                };
                views.push(ReservationView {
                    rid: r.rid,
                    paid: r.paid,
                    outbound,
                    connection,
                });
            }
            Ok(views)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(fid: i64, day: i32, origin: &str, dest: &str, duration: i32) -> Flight {
        Flight {
            fid,
            day_of_month: day,
            carrier_id: "AS".to_string(),
            flight_num: fid as i32,
            origin_city: origin.to_string(),
            dest_city: dest.to_string(),
            duration,
            capacity: 10,
            price: 100,
            canceled: false,
        }
    }

    #[tokio::test]
    async fn rollback_restores_the_snapshot() {
        let store = MemStore::new();
        let mut conn = store.session();

        conn.begin().await.unwrap();
        conn.insert_user("alice", b"digest", 100).await.unwrap();
        conn.rollback().await.unwrap();
        assert!(conn.find_user("alice").await.unwrap().is_none());

        conn.begin().await.unwrap();
        conn.insert_user("alice", b"digest", 100).await.unwrap();
        conn.commit().await.unwrap();
        assert!(conn.find_user("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn usernames_compare_case_insensitively() {
        let store = MemStore::new();
        let mut conn = store.session();

        conn.insert_user("Alice", b"digest", 100).await.unwrap();
        let found = conn.find_user("ALICE").await.unwrap().unwrap();
        // Original casing is preserved in the stored row.
        assert_eq!(found.username, "Alice");
        assert!(conn.insert_user("aLiCe", b"digest", 0).await.is_err());
    }

    #[tokio::test]
    async fn rids_are_assigned_sequentially() {
        let store = MemStore::new();
        store.insert_flight(flight(1, 4, "A", "B", 60)).await;
        let mut conn = store.session();
        conn.insert_user("bob", b"digest", 0).await.unwrap();

        assert_eq!(conn.insert_reservation("bob", 1, None).await.unwrap(), 1);
        assert_eq!(conn.insert_reservation("bob", 1, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn seats_taken_counts_both_legs_and_skips_cancelled() {
        let store = MemStore::new();
        store.insert_flight(flight(1, 4, "A", "B", 60)).await;
        store.insert_flight(flight(2, 4, "B", "C", 60)).await;
        let mut conn = store.session();
        conn.insert_user("bob", b"digest", 0).await.unwrap();

        let first = conn.insert_reservation("bob", 1, Some(2)).await.unwrap();
        conn.insert_reservation("bob", 2, None).await.unwrap();
        assert_eq!(conn.seats_taken(2).await.unwrap(), 2);

        conn.mark_cancelled(first).await.unwrap();
        assert_eq!(conn.seats_taken(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let store = MemStore::new();
        let mut conn = store.session();
        conn.begin().await.unwrap();
        assert!(conn.begin().await.is_err());
        assert!(conn.in_transaction());
        conn.commit().await.unwrap();
        assert!(!conn.in_transaction());
    }
}
