use ulid::Ulid;

/// Mint a ULID-based identifier carrying a short type prefix, e.g.
/// `usr_01J9ZK...`. The prefix makes ids self-describing in logs and wire
/// payloads; the ULID part keeps them sortable by creation time.
///
/// # Examples
/// ```
/// let id = buzzchat_common::id::prefixed_ulid(buzzchat_common::id::prefix::USER);
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const GROUP: &str = "grp";
    pub const MESSAGE: &str = "msg";
    pub const CONNECTION: &str = "conn";
    pub const GATEWAY: &str = "gw";
    pub const ATTACHMENT: &str = "att";
}
