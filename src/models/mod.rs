pub mod batch;
pub mod payload;
pub mod translation;
