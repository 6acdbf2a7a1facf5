pub mod salary;
pub mod sync;

pub use salary::{SalaryError, SalaryOrchestrator, SalaryRequest};
pub use sync::{SyncError, SyncReport, Synchronizer};
