mod context;

pub use context::{complete, SessionSettings};
