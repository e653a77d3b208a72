use skybook_core::error::{GuardError, StoreError};
use skybook_core::identity::{CredentialVerifier, Pbkdf2Verifier};
use skybook_core::models::Itinerary;
use skybook_core::store::StoreConn;

use crate::guard::TxUnit;

/// One client's session: its store connection, its login state, and the
/// itinerary cache produced by its last search.
///
/// A session is owned by exactly one caller and never shared; the itinerary
/// indices it hands out are meaningless in any other session. Login is
/// one-way; there is no logout transition.
pub struct Session<C, V = Pbkdf2Verifier> {
    pub(crate) conn: C,
    pub(crate) verifier: V,
    pub(crate) user: Option<String>,
    pub(crate) itineraries: Vec<Itinerary>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("User already logged in")]
    AlreadyLoggedIn,
    /// Unknown user, wrong password, and store failure are deliberately
    /// indistinguishable to the caller.
    #[error("Login failed")]
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateCustomerError {
    #[error("Failed to create user")]
    InvalidDeposit,
    #[error("Failed to create user")]
    UsernameTaken,
    #[error("Failed to create user")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Guard(#[from] GuardError),
}

impl<C: StoreConn> Session<C> {
    pub fn new(conn: C) -> Self {
        Self::with_verifier(conn, Pbkdf2Verifier::default())
    }
}

impl<C: StoreConn, V: CredentialVerifier> Session<C, V> {
    pub fn with_verifier(conn: C, verifier: V) -> Self {
        Self {
            conn,
            verifier,
            user: None,
            itineraries: Vec::new(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// The normalized identity this session holds, if any.
    pub fn current_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub async fn login(&mut self, username: &str, password: &str) -> String {
        match self.try_login(username, password).await {
            Ok(()) => format!("Logged in as {}\n", username),
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_login(&mut self, username: &str, password: &str) -> Result<(), LoginError> {
        if self.user.is_some() {
            return Err(LoginError::AlreadyLoggedIn);
        }
        let user = self
            .conn
            .find_user(username)
            .await
            .map_err(|_| LoginError::Failed)?
            .ok_or(LoginError::Failed)?;
        if !self.verifier.verify(password, &user.password_digest) {
            return Err(LoginError::Failed);
        }
        self.user = Some(username.to_lowercase());
        tracing::debug!(user = %username.to_lowercase(), "session logged in");
        Ok(())
    }

    pub async fn create_customer(
        &mut self,
        username: &str,
        password: &str,
        init_balance: i64,
    ) -> String {
        match self.try_create_customer(username, password, init_balance).await {
            Ok(()) => format!("Created user {}\n", username),
            Err(e) => format!("{}\n", e),
        }
    }

    pub async fn try_create_customer(
        &mut self,
        username: &str,
        password: &str,
        init_balance: i64,
    ) -> Result<(), CreateCustomerError> {
        if init_balance < 0 {
            return Err(CreateCustomerError::InvalidDeposit);
        }
        let digest = self.verifier.digest(password);

        let mut unit = TxUnit::begin(&mut self.conn).await?;
        let outcome = create_in_unit(unit.conn(), username, &digest, init_balance).await;
        unit.finish(outcome).await?;
        tracing::info!(username, "customer created");
        Ok(())
    }
}

async fn create_in_unit<C: StoreConn>(
    conn: &mut C,
    username: &str,
    digest: &[u8],
    balance: i64,
) -> Result<(), CreateCustomerError> {
    if conn.find_user(username).await?.is_some() {
        return Err(CreateCustomerError::UsernameTaken);
    }
    conn.insert_user(username, digest, balance).await?;
    Ok(())
}
