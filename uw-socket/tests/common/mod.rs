//! Shared test utilities for socket integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use uw_socket::memory::{self, MemoryServer};
use uw_socket::{Connection, ConnectionOptions};

/// Upper bound for any single step of a test.
pub const STEP: Duration = Duration::from_secs(5);

/// Options with short timeouts so forced paths finish quickly.
pub fn fast_options() -> ConnectionOptions {
    ConnectionOptions {
        connect_timeout: Duration::from_secs(2),
        close_timeout: Duration::from_millis(200),
        decode_report_capacity: 8,
    }
}

/// A connection over the memory transport that has not opened yet.
pub fn memory_connection() -> (Connection, MemoryServer) {
    let (connector, server) = memory::pair();
    let connection = Connection::with_connector("memory://room", connector, fast_options());
    (connection, server)
}

/// A connection over the memory transport, already open.
pub async fn open_connection() -> (Connection, MemoryServer) {
    let (connection, server) = memory_connection();
    within(connection.wait_open())
        .await
        .expect("memory connection should open");
    (connection, server)
}

/// Await `fut`, failing the test if it takes longer than [`STEP`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(STEP, fut)
        .await
        .expect("step timed out")
}

/// A `chatMessage` frame.
pub fn chat_frame(id: &str, user_id: &str, message: &str) -> String {
    serde_json::json!({
        "command": "chatMessage",
        "data": {"id": id, "userID": user_id, "message": message, "timestamp": 1_561_000_000_000_i64}
    })
    .to_string()
}
