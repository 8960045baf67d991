pub mod bitpack;
pub mod compression;
