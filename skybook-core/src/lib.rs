pub mod error;
pub mod identity;
pub mod models;
pub mod store;

pub use error::{GuardError, StoreError};
pub use identity::{CredentialVerifier, Pbkdf2Verifier};
pub use models::{Flight, Itinerary, ReservationQuote, ReservationView, User};
pub use store::StoreConn;
