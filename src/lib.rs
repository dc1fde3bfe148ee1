pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod providers;
pub mod receivables;
pub mod reconcile;
pub mod storage;
pub mod sync;
