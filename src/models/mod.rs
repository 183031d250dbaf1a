pub mod anime;
pub mod transfer;
