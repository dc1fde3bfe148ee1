mod bank_account;
mod id;
mod id_generator;
mod match_state;
mod receivable;
mod transaction;

pub use bank_account::BankAccount;
pub use id::{Id, IdError};
pub use id_generator::{FixedIdGenerator, IdGenerator, UuidIdGenerator};
pub use match_state::{
    Confidence, ConfidenceError, MatchMethod, MatchState, MatchStatus, Suggestion,
};
pub use receivable::CandidateReceivable;
pub use transaction::{
    BankTransaction, DedupKey, Direction, StateAction, StateChange,
};
