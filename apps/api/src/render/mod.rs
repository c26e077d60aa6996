pub mod handlers;
pub mod markdown;

pub use markdown::{render_markdown, InlineSpan, RenderNode};
