pub mod board;
pub mod store;
pub mod sync;
pub mod upload;
