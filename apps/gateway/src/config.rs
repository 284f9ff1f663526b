/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret used to verify client bearer tokens at the handshake.
    pub jwt_secret: String,
    /// Port the WebSocket server binds to.
    pub port: u16,
    /// Identity of this gateway instance. Unique per startup so the fan-out
    /// consumer group is never shared between instances.
    pub instance_id: String,
    /// Worker id fed to the snowflake generator of the persistence role.
    pub worker_id: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            instance_id: std::env::var("HOSTNAME")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| {
                    buzzchat_common::id::prefixed_ulid(buzzchat_common::id::prefix::GATEWAY)
                }),
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
