pub mod ancillary;
pub mod error;
pub mod events;
pub mod gateway;
pub mod itinerary;
pub mod passenger;
pub mod search;
pub mod session;

pub use ancillary::{AncillaryEntry, AncillaryKind, AncillarySelection, AncillarySelections};
pub use error::{BookingError, ErrorClassifier, ErrorKind, UpstreamError};
pub use gateway::UpstreamGateway;
pub use itinerary::{FareBreakdown, LegDescriptor, LegKey, OfferBinding, TripShape};
pub use passenger::{PassengerRecord, PaxType};
pub use session::{MemorySessionStore, SessionStore, StoreError};

pub type CoreResult<T> = Result<T, BookingError>;
