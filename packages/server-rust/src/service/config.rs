use tenantry_core::ScopingPolicy;

/// Server-level configuration for the data pipeline.
///
/// Fixed at startup; nothing here changes while the server runs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Unique identifier for this server node.
    pub node_id: String,
    /// Timeout applied to every data operation in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Data operations allowed in flight before new ones are shed.
    pub max_concurrent_operations: u32,
    /// Installation-wide tenant scoping policy.
    pub scoping: ScopingPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            scoping: ScopingPolicy::default(),
        }
    }
}
