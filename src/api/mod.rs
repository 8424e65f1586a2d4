// HTTP ingestion boundary

mod ingestion;

pub use ingestion::{create_router, AppState};
