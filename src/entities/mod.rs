pub mod prelude;

pub mod anime_documents;
pub mod system_logs;
pub mod transfer_batches;
