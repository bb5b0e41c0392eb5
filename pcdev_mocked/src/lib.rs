pub mod tracked;

pub use tracked::{Call, Op, TrackedBinder};
