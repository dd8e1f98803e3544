//! Execution collaborators and the services that drive them.

mod detail;
mod executor;
mod list;
mod search;

pub use detail::DetailService;
pub use executor::{PgExecutor, QueryExecutor};
pub use list::ListService;
pub use search::{PgTextSearch, TextSearch};
