pub mod catalog;
pub use catalog::{
    CatalogError, CatalogService, CatalogStore, NewAnime, NewEpisode, NewSeason, NewVideoSource,
    SeaOrmCatalogStore,
};

pub mod logs;
pub use logs::LogService;

pub mod retry;
pub mod source_id;

pub mod source;
pub use source::{ByteStream, DriveSource, RemoteSource, SourceError};

pub mod storage;
pub use storage::{BunnyStorage, ObjectStorage, StorageError};

pub mod transfer;
pub use transfer::{StartedBatch, TransferAccepted, TransferError, TransferService};
