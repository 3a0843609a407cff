mod network;
mod peer;

pub use network::{CallCounts, FakeServer};
pub use peer::{Roster, START_MS, TestClient, temp_sqlite};
