pub mod anime;
pub mod batch;
pub mod logs;
