//! Stream combinators used by the broadcast path

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
