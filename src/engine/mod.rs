//! Core engine: time gate, symbol scan, order lifecycle, and the session
//! that ties them together.

pub mod clock;
pub mod executor;
pub mod scanner;
pub mod session;
