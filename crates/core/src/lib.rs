pub mod clock;
pub mod error;
pub mod ids;
pub mod records;
pub mod session;
pub mod value;

pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use error::CoreError;
pub use ids::*;
pub use records::*;
pub use session::{Grant, GrantKind, LockReason, SessionWindow, WindowState};
pub use value::CellValue;
