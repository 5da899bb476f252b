//! S-expression command surface.

pub mod dispatch;

pub use dispatch::{escape_string, format_event, handle_message};
