//! Низкоуровневые помощники: выборки little-endian и текстовые поля
//! фиксированной ширины.

pub mod read;
pub mod write;

pub use read::*;
pub use write::*;
