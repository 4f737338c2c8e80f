//! Relational user store contract plus a sqlite-backed implementation, the
//! PBKDF2 passcode format, and the snowflake uid generator -- the
//! collaborator pieces sitting behind the session/message design that a
//! complete deployment still needs something concrete for.

pub mod passcode;
pub mod snowflake;
pub mod store;

pub use snowflake::SnowflakeGen;
pub use store::{SqliteUserStore, UserStore};
