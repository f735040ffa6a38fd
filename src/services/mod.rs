pub mod commit;
pub mod locking;
pub mod sweeper;

pub use commit::{CommitResult, CommitService};
pub use locking::{LockError, LockService, UnlockOutcome};
pub use sweeper::ExpirySweeper;
