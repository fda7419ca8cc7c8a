pub mod span;
pub mod entity;

pub use span::Span;
pub use entity::*;
