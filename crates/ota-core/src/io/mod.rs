//! IO modules - filesystem side effects

pub mod atomic;
pub mod extract;
