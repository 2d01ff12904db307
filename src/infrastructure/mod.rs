// Infrastructure - persistence, ids, observability and collaborator seams
pub mod database;          // CommentStore trait and the Postgres store
pub mod sqlite_database;   // SQLite store
pub mod monitoring;        // Metrics and tracing setup
pub mod store_decorators;  // Instrumented store
pub mod traits;            // Collaborator interfaces
pub mod viewer;            // Viewer context

pub use database::{CommentStore, PostgresCommentStore};
pub use monitoring::{init_tracing, MetricsCollector, OperationMetrics};
pub use sqlite_database::SqliteCommentStore;
pub use store_decorators::InstrumentedStore;
pub use traits::{IdentityProvider, PostDirectory};
pub use viewer::ViewerContext;
