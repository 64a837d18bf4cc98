pub mod compression;
pub mod records;
