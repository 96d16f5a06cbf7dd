pub mod aggregate;
pub mod ledger;
pub mod ports;
pub mod registry;
pub mod resolver;
pub mod session;

pub use ledger::AllocationLedger;
pub use ports::{AllocationStore, CounterpartPriceSource, MaterialSearch};
pub use registry::SessionRegistry;
pub use resolver::{CandidateResolver, SearchGate};
pub use session::{CompositionSession, SessionState};
