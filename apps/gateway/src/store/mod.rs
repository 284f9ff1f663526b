pub mod directory;
pub mod kv;
pub mod messages;
