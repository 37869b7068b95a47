pub mod config;
pub mod item;
pub mod schema;

pub use config::{ColumnMap, ConfigError, RunConfig};
pub use item::{AnnotationRecord, Identity, IdentityColumns, IdentityKey, Verdict, WorkItem};
pub use schema::ledger;
