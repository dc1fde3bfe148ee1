//! Tiered auto-matching of incoming bank transactions to outstanding dues.
//!
//! Tiers, in order: counterparty IBAN, resident name plus amount, amount only,
//! unit number. The first two credit the due directly; the last two only
//! produce suggestions for an operator.

mod engine;
pub mod text;

pub use engine::{
    AutoMatchEngine, DefinitiveMatch, MatchOutcome, MatchResult, MatchTier, NO_CANDIDATES_REASON,
    NO_HITS_REASON, OUTGOING_REASON,
};
