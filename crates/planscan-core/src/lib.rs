pub mod analysis;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod store;
