//! Generic tile grid geometry.
//!
//! Coordinates are column-offset: on hexagonal maps every odd column is
//! shifted half a cell up compared to the even columns.

mod layout;
pub use layout::{numerical_number, BlockLine, Layout};

mod trace;
pub use trace::LineTracer;
