pub mod query;
pub mod state;

pub use query::{select_query, CountQuery, CountScope, EntryQuery, QueryHandle, QuerySelection};
pub use state::{now_millis, FilterTab, ViewScope, ViewState};
