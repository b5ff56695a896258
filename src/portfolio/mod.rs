pub mod account;
pub mod position;
pub mod trade;

pub use account::{Account, OpenRejection, OpenRequest};
pub use position::{Direction, Position};
pub use trade::{ExitReason, Trade};
