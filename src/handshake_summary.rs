use std::sync::Arc;

use bytes::Bytes;

use crate::security_params::SecurityParameters;
use crate::session::Session;

/// Everything interesting collected by a completed handshake.
pub struct HandshakeSummary {
    /// If ALPN ids were offered, the one the server selected. None when
    /// the peer doesn't speak ALPN.
    pub selected_alpn_protocol: Option<Bytes>,

    /// The session this connection runs under; cached for resumption when
    /// it carries a non-empty id.
    pub session: Arc<Session>,

    /// Frozen snapshot of the negotiated parameters.
    pub security: Arc<SecurityParameters>,
}
