mod scored_queue;

pub use scored_queue::*;
