use serde::{Deserialize, Serialize};
use std::fmt;

/// A single flight as stored in the Flights table. Flight data is owned by
/// an external scheduling process and is read-only to this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub fid: i64,
    pub day_of_month: i32,
    pub carrier_id: String,
    pub flight_num: i32,
    pub origin_city: String,
    pub dest_city: String,
    pub duration: i32,
    pub capacity: i32,
    pub price: i64,
    pub canceled: bool,
}

impl fmt::Display for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: {} Day: {} Carrier: {} Number: {} Origin: {} Dest: {} Duration: {} Capacity: {} Price: {}",
            self.fid,
            self.day_of_month,
            self.carrier_id,
            self.flight_num,
            self.origin_city,
            self.dest_city,
            self.duration,
            self.capacity,
            self.price
        )
    }
}

/// A registered customer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_digest: Vec<u8>,
    pub balance: i64,
}

/// A search result of one or two legs for a given day. Itineraries live only
/// in the session that produced them and are addressed by their position in
/// that session's cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Itinerary {
    pub day: i32,
    pub outbound: Flight,
    pub connection: Option<Flight>,
}

impl Itinerary {
    pub fn direct(outbound: Flight) -> Self {
        Self {
            day: outbound.day_of_month,
            outbound,
            connection: None,
        }
    }

    pub fn one_stop(outbound: Flight, connection: Flight) -> Self {
        Self {
            day: outbound.day_of_month,
            outbound,
            connection: Some(connection),
        }
    }

    pub fn total_duration(&self) -> i32 {
        self.outbound.duration + self.connection.as_ref().map_or(0, |f| f.duration)
    }

    pub fn leg_count(&self) -> usize {
        if self.connection.is_some() {
            2
        } else {
            1
        }
    }

    pub fn fid1(&self) -> i64 {
        self.outbound.fid
    }

    pub fn fid2(&self) -> Option<i64> {
        self.connection.as_ref().map(|f| f.fid)
    }
}

impl fmt::Display for Itinerary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} flight(s), {} minutes",
            self.leg_count(),
            self.total_duration()
        )?;
        writeln!(f, "{}", self.outbound)?;
        if let Some(connection) = &self.connection {
            writeln!(f, "{}", connection)?;
        }
        Ok(())
    }
}

/// Settlement view of a reservation: the total itinerary price joined with
/// the owner's current balance, as read inside one transactional unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationQuote {
    pub paid: bool,
    pub total_price: i64,
    pub balance: i64,
}

/// One entry of a user's reservation manifest, with both legs resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationView {
    pub rid: i64,
    pub paid: bool,
    pub outbound: Flight,
    pub connection: Option<Flight>,
}

impl fmt::Display for ReservationView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reservation {} paid: {}:", self.rid, self.paid)?;
        writeln!(f, "{}", self.outbound)?;
        if let Some(connection) = &self.connection {
            writeln!(f, "{}", connection)?;
        }
        Ok(())
    }
}
