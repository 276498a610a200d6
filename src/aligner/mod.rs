//! External forced-alignment backends.
//!
//! The pipeline only sees the [`ForcedAligner`] trait. [`MfaAligner`] drives
//! the Montreal Forced Aligner CLI; [`MockAligner`] simulates one for tests.

pub mod backend;
pub mod mfa;

pub use backend::{AlignRequest, CancelFlag, ForcedAligner, MockAligner, MockFailure};
pub use mfa::{MfaAligner, MfaConfig};
