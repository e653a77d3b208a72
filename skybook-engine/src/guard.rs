use skybook_core::error::{GuardError, StoreError};
use skybook_core::store::StoreConn;

/// Scoped acquisition of one transactional unit over a store connection.
///
/// `begin` opens the transaction; [`finish`](TxUnit::finish) commits on `Ok`
/// and rolls back on `Err`, then verifies the connection holds no open
/// transaction before handing it back. Every operation that issues more than
/// one store statement runs inside a unit, so the connection stays reusable
/// by the next operation no matter how this one ended.
pub struct TxUnit<'a, C: StoreConn> {
    conn: &'a mut C,
    open: bool,
}

impl<'a, C: StoreConn> TxUnit<'a, C> {
    pub async fn begin(conn: &'a mut C) -> Result<TxUnit<'a, C>, StoreError> {
        conn.begin().await?;
        Ok(TxUnit { conn, open: true })
    }

    pub fn conn(&mut self) -> &mut C {
        self.conn
    }

    /// Resolve the unit: commit on `Ok`, roll back on `Err`. A rollback that
    /// itself fails surfaces as [`GuardError::RollbackFailed`] since the
    /// connection may now hold a dangling transaction.
    pub async fn finish<T, E>(mut self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError> + From<GuardError>,
    {
        self.open = false;
        let result: Result<T, E> = match outcome {
            Ok(value) => match self.conn.commit().await {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    tracing::warn!(error = %commit_err, "commit failed, rolling back unit");
                    match self.conn.rollback().await {
                        Ok(()) => Err(E::from(commit_err)),
                        Err(rollback_err) => {
                            tracing::error!(error = %rollback_err, "rollback failed after failed commit");
                            return Err(E::from(GuardError::RollbackFailed(rollback_err)));
                        }
                    }
                }
            },
            Err(err) => match self.conn.rollback().await {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    tracing::error!(error = %rollback_err, "rollback failed, connection may dangle");
                    return Err(E::from(GuardError::RollbackFailed(rollback_err)));
                }
            },
        };

        // Commit and rollback both claimed success past this point; verify
        // the connection really is clean before handing it back.
        if self.conn.in_transaction() {
            tracing::error!("transaction still open after unit finished");
            return Err(E::from(GuardError::Dangling));
        }
        result
    }
}

impl<C: StoreConn> Drop for TxUnit<'_, C> {
    fn drop(&mut self) {
        if self.open {
            // Backstop only: units are always resolved through `finish`.
            tracing::error!("transaction unit dropped while open, connection left dangling");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skybook_core::models::{Flight, ReservationQuote, ReservationView, User};

    #[derive(Default)]
    struct StubConn {
        in_tx: bool,
        fail_commit: bool,
        fail_rollback: bool,
        commits: usize,
        rollbacks: usize,
    }

    #[async_trait]
    impl StoreConn for StubConn {
        async fn begin(&mut self) -> Result<(), StoreError> {
            self.in_tx = true;
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            if self.fail_commit {
                return Err(StoreError::Tx("commit refused".to_string()));
            }
            self.in_tx = false;
            self.commits += 1;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), StoreError> {
            if self.fail_rollback {
                return Err(StoreError::Tx("rollback refused".to_string()));
            }
            self.in_tx = false;
            self.rollbacks += 1;
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            self.in_tx
        }

        async fn find_user(&mut self, _: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }

        async fn insert_user(&mut self, _: &str, _: &[u8], _: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn set_balance(&mut self, _: &str, _: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn direct_flights(
            &mut self,
            _: &str,
            _: &str,
            _: i32,
            _: i64,
        ) -> Result<Vec<Flight>, StoreError> {
            Ok(Vec::new())
        }

        async fn connecting_flights(
            &mut self,
            _: &str,
            _: &str,
            _: i32,
            _: i64,
        ) -> Result<Vec<(Flight, Flight)>, StoreError> {
            Ok(Vec::new())
        }

        async fn has_reservation_on_day(&mut self, _: &str, _: i32) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn seats_taken(&mut self, _: i64) -> Result<i64, StoreError> {
            Ok(0)
        }

        async fn seat_capacity(&mut self, _: i64) -> Result<Option<i32>, StoreError> {
            Ok(None)
        }

        async fn insert_reservation(
            &mut self,
            _: &str,
            _: i64,
            _: Option<i64>,
        ) -> Result<i64, StoreError> {
            Ok(1)
        }

        async fn unpaid_reservation(
            &mut self,
            _: &str,
            _: i64,
        ) -> Result<Option<ReservationQuote>, StoreError> {
            Ok(None)
        }

        async fn active_reservation(
            &mut self,
            _: &str,
            _: i64,
        ) -> Result<Option<ReservationQuote>, StoreError> {
            Ok(None)
        }

        async fn mark_paid(&mut self, _: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn mark_cancelled(&mut self, _: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn reservations_for(&mut self, _: &str) -> Result<Vec<ReservationView>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum UnitError {
        #[error("store: {0}")]
        Store(#[from] StoreError),
        #[error("{0}")]
        Guard(#[from] GuardError),
    }

    #[tokio::test]
    async fn ok_outcome_commits() {
        let mut conn = StubConn::default();
        let unit = TxUnit::begin(&mut conn).await.unwrap();
        let result: Result<i64, UnitError> = unit.finish(Ok(7)).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(conn.commits, 1);
        assert_eq!(conn.rollbacks, 0);
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn err_outcome_rolls_back() {
        let mut conn = StubConn::default();
        let unit = TxUnit::begin(&mut conn).await.unwrap();
        let outcome: Result<(), UnitError> =
            Err(UnitError::Store(StoreError::Query("boom".to_string())));
        let result = unit.finish(outcome).await;
        assert!(matches!(result, Err(UnitError::Store(_))));
        assert_eq!(conn.commits, 0);
        assert_eq!(conn.rollbacks, 1);
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn failed_commit_still_rolls_back() {
        let mut conn = StubConn {
            fail_commit: true,
            ..StubConn::default()
        };
        let unit = TxUnit::begin(&mut conn).await.unwrap();
        let result: Result<(), UnitError> = unit.finish(Ok(())).await;
        assert!(matches!(result, Err(UnitError::Store(_))));
        assert_eq!(conn.rollbacks, 1);
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn failed_rollback_surfaces_as_guard_error() {
        let mut conn = StubConn {
            fail_rollback: true,
            ..StubConn::default()
        };
        let unit = TxUnit::begin(&mut conn).await.unwrap();
        let outcome: Result<(), UnitError> =
            Err(UnitError::Store(StoreError::Query("boom".to_string())));
        let result = unit.finish(outcome).await;
        assert!(matches!(
            result,
            Err(UnitError::Guard(GuardError::RollbackFailed(_)))
        ));
    }
}
