pub mod bunny;
pub mod drive;
