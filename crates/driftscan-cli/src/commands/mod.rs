pub mod info;
pub mod search;
pub mod simulate;
