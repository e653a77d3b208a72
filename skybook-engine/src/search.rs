use std::cmp::Ordering;
use std::fmt::Write as _;

use skybook_core::error::{GuardError, StoreError};
use skybook_core::identity::CredentialVerifier;
use skybook_core::models::Itinerary;
use skybook_core::store::StoreConn;

use crate::guard::TxUnit;
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Failed to search")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Guard(#[from] GuardError),
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    /// Search itineraries from `origin` to `dest` on `day`, direct first,
    /// two-leg connections filling whatever the direct results left of
    /// `limit`. The session's itinerary cache is replaced by the result,
    /// and cleared even when the search fails or matches nothing.
    pub async fn search(
        &mut self,
        origin: &str,
        dest: &str,
        direct_only: bool,
        day: i32,
        limit: i64,
    ) -> String {
        self.itineraries.clear();
        match self.try_search(origin, dest, direct_only, day, limit).await {
            Ok(found) if found.is_empty() => "No flights match your selection\n".to_string(),
            Ok(found) => {
                self.itineraries = found;
                let mut out = String::new();
                for (i, itinerary) in self.itineraries.iter().enumerate() {
                    let _ = write!(out, "Itinerary {}: {}", i, itinerary);
                }
                out
            }
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_search(
        &mut self,
        origin: &str,
        dest: &str,
        direct_only: bool,
        day: i32,
        limit: i64,
    ) -> Result<Vec<Itinerary>, SearchError> {
        // Both queries share one unit so they read a consistent snapshot.
        let mut unit = TxUnit::begin(&mut self.conn).await?;
        let outcome = search_in_unit(unit.conn(), origin, dest, direct_only, day, limit).await;
        unit.finish(outcome).await
    }
}

async fn search_in_unit<C: StoreConn>(
    conn: &mut C,
    origin: &str,
    dest: &str,
    direct_only: bool,
    day: i32,
    limit: i64,
) -> Result<Vec<Itinerary>, SearchError> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let direct = conn.direct_flights(origin, dest, day, limit).await?;
    let mut found: Vec<Itinerary> = direct.into_iter().map(Itinerary::direct).collect();

    if !direct_only && (found.len() as i64) < limit {
        let remaining = limit - found.len() as i64;
        let pairs = conn.connecting_flights(origin, dest, day, remaining).await?;
        found.extend(pairs.into_iter().map(|(a, b)| Itinerary::one_stop(a, b)));
    }

    found.sort_by(merge_order);
    Ok(found)
}

/// Total ordering over the merged direct + connecting results: total
/// duration, then fewer legs, then fid1, then fid2. The two source queries
/// only order within themselves, so the merge needs its own deterministic
/// tie-break.
fn merge_order(a: &Itinerary, b: &Itinerary) -> Ordering {
    (a.total_duration(), a.leg_count(), a.fid1(), a.fid2())
        .cmp(&(b.total_duration(), b.leg_count(), b.fid1(), b.fid2()))
}
