use std::time::Duration;

/// Upper bound on a single processor or email call. A notification job makes at
/// most a few of these, so the whole job finishes inside the queue's claim lease.
pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared client for every outbound call the service makes.
pub fn outbound_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}
