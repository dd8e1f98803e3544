//! List requests: shape, scoping, per-model behavior and the orchestrator.

pub mod model;
pub mod orchestrator;
pub mod request;
pub mod scope;

pub use model::SortKey;
pub use orchestrator::{FacetQuery, ListOrchestrator};
pub use request::{FacetFilter, ListFilter, ListRequest, ListRequestState, SimilarityFilter, SortSpec};
pub use scope::ScopingMode;
