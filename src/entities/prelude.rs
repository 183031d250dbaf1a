pub use super::anime_documents::Entity as AnimeDocuments;
pub use super::system_logs::Entity as SystemLogs;
pub use super::transfer_batches::Entity as TransferBatches;
