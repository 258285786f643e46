pub mod error;
pub mod indent;
pub mod line;
pub mod markup;
pub mod syntax;

pub use error::SyntaxError;
pub use indent::IndentTracker;
pub use line::{LogicalLine, logical_lines};
pub use markup::{CloseKind, MarkupRules, TagRule, end_tag, start_tag};
