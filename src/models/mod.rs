// Comment rows and the nested thread structure built from them

pub mod comment;

pub use comment::{current_time_millis, Comment, ThreadNode, ThreadStats};
