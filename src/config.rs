/// Hard ceiling on any single reassembled frame, enforced regardless of what
/// the caller configures (spec: "we enforce a hard limit of 256 MB on all
/// frames during parsing, rejecting larger").
pub const MAX_FRAME_HARD_LIMIT: usize = 256 << 20;

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: Option<usize>,
    pub max_message_size: Option<usize>,
}

impl WebSocketConfig {
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
            .unwrap_or(16 << 20)
            .min(MAX_FRAME_HARD_LIMIT)
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
            .unwrap_or(64 << 20)
            .min(MAX_FRAME_HARD_LIMIT)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: Some(16 << 20),
            max_message_size: Some(64 << 20),
        }
    }
}

/// Tunables for the connection engine (`ProcessLoop`) and the callback
/// arbitrator, per spec §3/§4.E/§4.F.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// 0 disables heartbeat pings entirely.
    pub heartbeat_ms: u64,
    /// Upper bound the adaptive idle sleep is clamped to, when set.
    pub loop_delay_ms: Option<u64>,
    /// Hard budget for acquiring the connection lock `L`.
    pub acquire_timeout_ms: u64,
    /// Hard budget for `BlockWithAnswer` to wait for a reply.
    pub answer_timeout_ms: u64,
    /// true on the client side (outgoing frames are masked), false on the
    /// server side.
    pub mask_outgoing: bool,
    pub websocket: WebSocketConfig,
}

impl ConnectionConfig {
    pub fn server(websocket: WebSocketConfig) -> Self {
        ConnectionConfig {
            heartbeat_ms: 15_000,
            loop_delay_ms: None,
            acquire_timeout_ms: 5_000,
            answer_timeout_ms: 10_000,
            mask_outgoing: false,
            websocket,
        }
    }

    pub fn client(websocket: WebSocketConfig) -> Self {
        ConnectionConfig {
            // servers usually drive the heartbeat; off by default on the client (spec §4.G)
            heartbeat_ms: 0,
            loop_delay_ms: None,
            acquire_timeout_ms: 5_000,
            answer_timeout_ms: 10_000,
            mask_outgoing: true,
            websocket,
        }
    }
}
