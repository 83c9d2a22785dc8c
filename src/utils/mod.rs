pub mod content_type;
pub mod keyed_mutex;
pub mod validation;
