pub mod episode;
pub mod naming;
