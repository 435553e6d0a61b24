//! Rate limiting logic and state management.

mod gate;
mod window;

pub use gate::{Admission, AdmissionGate};
pub use window::{Decision, RateLimit, RateWindow, TimeWindow};
