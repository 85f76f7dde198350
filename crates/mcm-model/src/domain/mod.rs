mod entity;
pub use entity::{Entity, EntityRecord};

mod error_kind;
pub use error_kind::ErrorKind;

mod query;
pub use query::EntityQuery;

mod server;
pub use server::{ServerDetails, ServerRecord};

mod user;
pub use user::UserRecord;

/// Identifier issued by the entity store.
///
/// Ids start at `0` and are never reused within a collection.
pub type EntityId = i64;

/// Identifier of a persisted [`ServerRecord`].
pub type ServerId = EntityId;

/// Identifier of a persisted [`UserRecord`].
pub type UserId = EntityId;

/// Collection holding [`ServerRecord`] rows.
pub const SERVERS: &str = "servers";

/// Collection holding [`UserRecord`] rows.
pub const USERS: &str = "users";
