/// Errors that can occur in the transport layer.
///
/// Transport failures never crash a peer — they surface as a
/// connection-status change at the presence layer. The variants exist so
/// the peer loop can tell "remote went away" from "I was shut down".
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The mesh or relay link was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending to the mesh failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving from the mesh failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Dialing or accepting a connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The transport was shut down locally.
    #[error("transport shut down")]
    Shutdown,
}
