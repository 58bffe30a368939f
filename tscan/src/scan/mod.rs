//! Section filtering, scheduling and scan orchestration.

pub mod dedup;
pub mod driver;
pub mod filter;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dedup::DedupPolicy;
pub use driver::{AtscStandard, DvbtStandard, ScanConfig, ScanDriver};
pub use filter::{FilterSpec, SectionFilter};
pub use scheduler::FilterScheduler;
pub use session::ScanSession;
