pub mod categories;
pub mod data;
pub mod discovery;
pub mod error;
pub mod jobs;
pub mod model;
pub mod price;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod selection;
pub mod settings;
pub mod url_identity;

pub use data::{Database, DocumentStore, MemoryStore};
pub use discovery::{DiscoveryPipeline, DiscoveryStats, PageKind, PageReport};
pub use error::{CoreError, Result};
pub use jobs::{DiscoveryOutcome, FollowUp, JobRunner};
pub use model::{CatalogEntry, CategoryNode, Competitor, ProductStatus, Task, TaskStatus};
pub use progress::{TaskRegistry, TaskUpdate, UnitTally};
pub use reconcile::{ReconcileStats, reconcile};
pub use selection::ProductFilter;
pub use settings::Settings;
pub use url_identity::normalize;
