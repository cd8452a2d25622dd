//! Persistence layer: guest directory and visit ledger, hosted (PostgREST)
//! or in-memory.

pub mod memory;
pub mod model;
pub mod postgrest;
pub mod traits;

pub use memory::{InMemoryDirectory, InMemoryLedger};
pub use model::{
    GuestRecord, GuestUpdate, NewGuest, NewVisit, VisitHistory, VisitRecord,
};
pub use postgrest::{PostgrestClient, PostgrestDirectory, PostgrestLedger};
pub use traits::{GuestDirectory, VisitLedger};
