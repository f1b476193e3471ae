pub mod align;
pub mod compiler;
pub mod fallback;
pub mod plan;
pub mod render;
pub mod split;
pub mod timeline;

pub use timeline::*;
pub use compiler::*;
pub use plan::*;
