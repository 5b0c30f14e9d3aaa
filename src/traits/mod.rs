pub mod clock;
pub mod operator;

pub use clock::{IntervalClock, ManualClock, TickClock};
pub use operator::{op, FnOperator, Identity, Operator};
