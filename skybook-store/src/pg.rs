use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};
use tracing::debug;

use skybook_core::error::StoreError;
use skybook_core::models::{Flight, ReservationQuote, ReservationView, User};
use skybook_core::store::StoreConn;

use crate::database::DbClient;

/// Postgres store adapter: one pooled connection driven through explicit
/// BEGIN/COMMIT/ROLLBACK so a session's transactional unit spans exactly the
/// statements the engines issue on it.
///
/// Transactions open at SERIALIZABLE so the capacity and balance
/// check-then-act spans cannot interleave across sessions.
pub struct PgStore {
    conn: PoolConnection<Postgres>,
    in_tx: bool,
}

impl PgStore {
    pub async fn acquire(db: &DbClient) -> Result<Self, StoreError> {
        let conn = db
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn, in_tx: false })
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    fid: i64,
    day_of_month: i32,
    carrier_id: String,
    flight_num: i32,
    origin_city: String,
    dest_city: String,
    duration: i32,
    capacity: i32,
    price: i64,
    canceled: bool,
}

impl From<FlightRow> for Flight {
    fn from(row: FlightRow) -> Self {
        Flight {
            fid: row.fid,
            day_of_month: row.day_of_month,
            carrier_id: row.carrier_id,
            flight_num: row.flight_num,
            origin_city: row.origin_city,
            dest_city: row.dest_city,
            duration: row.duration,
            capacity: row.capacity,
            price: row.price,
            canceled: row.canceled,
        }
    }
}

const FLIGHT_COLUMNS: &str = "fid, day_of_month, carrier_id, flight_num, origin_city, dest_city, \
     duration, capacity, price, canceled";

fn flight_from_prefixed(row: &sqlx::postgres::PgRow, prefix: &str) -> Result<Flight, sqlx::Error> {
    let col = |name: &str| format!("{}_{}", prefix, name);
    Ok(Flight {
        fid: row.try_get(col("fid").as_str())?,
        day_of_month: row.try_get(col("day_of_month").as_str())?,
        carrier_id: row.try_get(col("carrier_id").as_str())?,
        flight_num: row.try_get(col("flight_num").as_str())?,
        origin_city: row.try_get(col("origin_city").as_str())?,
        dest_city: row.try_get(col("dest_city").as_str())?,
        duration: row.try_get(col("duration").as_str())?,
        capacity: row.try_get(col("capacity").as_str())?,
        price: row.try_get(col("price").as_str())?,
        canceled: row.try_get(col("canceled").as_str())?,
    })
}

fn prefixed_flight_columns(alias: &str, prefix: &str) -> String {
    [
        "fid",
        "day_of_month",
        "carrier_id",
        "flight_num",
        "origin_city",
        "dest_city",
        "duration",
        "capacity",
        "price",
        "canceled",
    ]
    .iter()
    .map(|c| format!("{alias}.{c} AS {prefix}_{c}"))
    .collect::<Vec<_>>()
    .join(", ")
}

#[async_trait]
impl StoreConn for PgStore {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_tx {
            return Err(StoreError::Tx("transaction already open".to_string()));
        }
        sqlx::query("BEGIN ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StoreError::Tx(e.to_string()))?;
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Err(StoreError::Tx("no open transaction".to_string()));
        }
        // On a failed COMMIT the server leaves the transaction aborted; keep
        // the flag set so the guard still issues the ROLLBACK.
        sqlx::query("COMMIT")
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StoreError::Tx(e.to_string()))?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Err(StoreError::Tx("no open transaction".to_string()));
        }
        sqlx::query("ROLLBACK")
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StoreError::Tx(e.to_string()))?;
        self.in_tx = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    async fn find_user(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT username, password_digest, balance FROM Users \
             WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(query_err)?;

        row.map(|r| {
            Ok(User {
                username: r.try_get("username").map_err(query_err)?,
                password_digest: r.try_get("password_digest").map_err(query_err)?,
                balance: r.try_get("balance").map_err(query_err)?,
            })
        })
        .transpose()
    }

    async fn insert_user(
        &mut self,
        username: &str,
        digest: &[u8],
        balance: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO Users(username, password_digest, balance) VALUES($1, $2, $3)")
            .bind(username)
            .bind(digest)
            .bind(balance)
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        debug!(username, "user row inserted");
        Ok(())
    }

    async fn set_balance(&mut self, username: &str, balance: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE Users SET balance = $1 WHERE LOWER(username) = LOWER($2)")
            .bind(balance)
            .bind(username)
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("user {} not found", username)));
        }
        Ok(())
    }

    async fn direct_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<Flight>, StoreError> {
        let sql = format!(
            "SELECT {FLIGHT_COLUMNS} FROM Flights \
             WHERE origin_city = $1 AND dest_city = $2 AND day_of_month = $3 AND NOT canceled \
             ORDER BY duration ASC, fid ASC LIMIT $4"
        );
        let rows: Vec<FlightRow> = sqlx::query_as(&sql)
            .bind(origin)
            .bind(dest)
            .bind(day)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(rows.into_iter().map(Flight::from).collect())
    }

    async fn connecting_flights(
        &mut self,
        origin: &str,
        dest: &str,
        day: i32,
        limit: i64,
    ) -> Result<Vec<(Flight, Flight)>, StoreError> {
        let sql = format!(
            "SELECT {}, {} FROM Flights f1 \
             JOIN Flights f2 ON f1.day_of_month = f2.day_of_month AND f1.dest_city = f2.origin_city \
             WHERE f1.origin_city = $1 AND f2.dest_city = $2 AND f1.day_of_month = $3 \
               AND NOT f1.canceled AND NOT f2.canceled \
             ORDER BY f1.duration + f2.duration ASC, f1.fid ASC, f2.fid ASC LIMIT $4",
            prefixed_flight_columns("f1", "f1"),
            prefixed_flight_columns("f2", "f2"),
        );
        let rows = sqlx::query(&sql)
            .bind(origin)
            .bind(dest)
            .bind(day)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            let first = flight_from_prefixed(row, "f1").map_err(query_err)?;
            let second = flight_from_prefixed(row, "f2").map_err(query_err)?;
            pairs.push((first, second));
        }
        Ok(pairs)
    }

    async fn has_reservation_on_day(
        &mut self,
        username: &str,
        day: i32,
    ) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS( \
               SELECT 1 FROM Reservations r \
               JOIN Flights f ON f.fid = r.fid1 \
               WHERE LOWER(r.username) = LOWER($1) AND f.day_of_month = $2 AND NOT r.cancelled)",
        )
        .bind(username)
        .bind(day)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(query_err)?;
        Ok(exists)
    }

    async fn seats_taken(&mut self, fid: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM Reservations \
             WHERE (fid1 = $1 OR fid2 = $1) AND NOT cancelled",
        )
        .bind(fid)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(query_err)?;
        Ok(count)
    }

    async fn seat_capacity(&mut self, fid: i64) -> Result<Option<i32>, StoreError> {
        sqlx::query_scalar("SELECT capacity FROM Flights WHERE fid = $1")
            .bind(fid)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)
    }

    async fn insert_reservation(
        &mut self,
        username: &str,
        fid1: i64,
        fid2: Option<i64>,
    ) -> Result<i64, StoreError> {
        let rid: i64 = sqlx::query_scalar(
            "INSERT INTO Reservations(username, fid1, fid2, paid, cancelled) \
             VALUES($1, $2, $3, FALSE, FALSE) RETURNING rid",
        )
        .bind(username)
        .bind(fid1)
        .bind(fid2)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(query_err)?;
        debug!(rid, username, "reservation row inserted");
        Ok(rid)
    }

    async fn unpaid_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError> {
        self.settlement_view(username, rid, true).await
    }

    async fn active_reservation(
        &mut self,
        username: &str,
        rid: i64,
    ) -> Result<Option<ReservationQuote>, StoreError> {
        self.settlement_view(username, rid, false).await
    }

    async fn mark_paid(&mut self, rid: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE Reservations SET paid = TRUE WHERE rid = $1 AND NOT paid")
            .bind(rid)
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("reservation {} not payable", rid)));
        }
        Ok(())
    }

    async fn mark_cancelled(&mut self, rid: i64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE Reservations SET cancelled = TRUE WHERE rid = $1 AND NOT cancelled")
                .bind(rid)
                .execute(&mut *self.conn)
                .await
                .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!(
                "reservation {} not cancellable",
                rid
            )));
        }
        Ok(())
    }

    async fn reservations_for(
        &mut self,
        username: &str,
    ) -> Result<Vec<ReservationView>, StoreError> {
        let sql = format!(
            "SELECT r.rid, r.paid, {}, {} FROM Reservations r \
             JOIN Flights f1 ON f1.fid = r.fid1 \
             LEFT JOIN Flights f2 ON f2.fid = r.fid2 \
             WHERE LOWER(r.username) = LOWER($1) AND NOT r.cancelled \
             ORDER BY r.rid ASC",
            prefixed_flight_columns("f1", "f1"),
            nullable_second_leg_columns(),
        );
        let rows = sqlx::query(&sql)
            .bind(username)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let outbound = flight_from_prefixed(row, "f1").map_err(query_err)?;
            let second_fid: Option<i64> = row.try_get("f2_fid").map_err(query_err)?;
            let connection = match second_fid {
                Some(_) => Some(second_leg_from(row).map_err(query_err)?),
                None => None,
            };
            views.push(ReservationView {
                rid: row.try_get("rid").map_err(query_err)?,
                paid: row.try_get("paid").map_err(query_err)?,
                outbound,
                connection,
            });
        }
        Ok(views)
    }
}

impl PgStore {
    async fn settlement_view(
        &mut self,
        username: &str,
        rid: i64,
        unpaid_only: bool,
    ) -> Result<Option<ReservationQuote>, StoreError> {
        let paid_filter = if unpaid_only { "AND NOT r.paid" } else { "" };
        let sql = format!(
            "SELECT r.paid, u.balance, f1.price + COALESCE(f2.price, 0) AS total_price \
             FROM Reservations r \
             JOIN Users u ON LOWER(u.username) = LOWER(r.username) \
             JOIN Flights f1 ON f1.fid = r.fid1 \
             LEFT JOIN Flights f2 ON f2.fid = r.fid2 \
             WHERE LOWER(r.username) = LOWER($1) AND r.rid = $2 AND NOT r.cancelled {paid_filter}"
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .bind(rid)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;

        row.map(|r| {
            Ok(ReservationQuote {
                paid: r.try_get("paid").map_err(query_err)?,
                total_price: r.try_get("total_price").map_err(query_err)?,
                balance: r.try_get("balance").map_err(query_err)?,
            })
        })
        .transpose()
    }
}

// The LEFT JOIN makes every second-leg column nullable, so the manifest
// reads them as Options and only assembles the leg when fid2 was present.
fn nullable_second_leg_columns() -> String {
    prefixed_flight_columns("f2", "f2")
}

fn second_leg_from(row: &sqlx::postgres::PgRow) -> Result<Flight, sqlx::Error> {
    flight_from_prefixed(row, "f2")
}
