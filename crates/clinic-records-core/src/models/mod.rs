//! Domain models for the clinic records system.

mod observation;
mod person;

pub use observation::*;
pub use person::*;
