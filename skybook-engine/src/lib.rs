pub mod booking;
pub mod cancellation;
pub mod guard;
pub mod payment;
pub mod reservations;
pub mod search;
pub mod session;

pub use booking::BookError;
pub use cancellation::CancelError;
pub use guard::TxUnit;
pub use payment::PayError;
pub use reservations::ReservationsError;
pub use search::SearchError;
pub use session::{CreateCustomerError, LoginError, Session};
