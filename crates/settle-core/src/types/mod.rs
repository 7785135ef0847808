//! 공통 값 타입.

mod precision;

pub use precision::*;
