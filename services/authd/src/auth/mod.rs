//! Token plumbing: the injected clock, signing key material, and the tokenizer.
pub mod clock;
pub mod keys;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use keys::{SigningKey, generate_signing_key};
pub use token::{Claims, TokenError, Tokenizer};
