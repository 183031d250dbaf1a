mod batches;
mod files;
mod list;
mod transfer;

pub use batches::cmd_batches;
pub use files::cmd_list_files;
pub use list::cmd_list_anime;
pub use transfer::cmd_transfer;
