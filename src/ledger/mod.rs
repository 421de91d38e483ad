pub mod engine;
pub mod reference;
pub mod requests;

pub use engine::{StatusEngine, TransitionOutcome};
pub use reference::ReferenceGenerator;
pub use requests::{DepositRequest, TransactionRequests, WithdrawalRequest};
