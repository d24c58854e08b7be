pub mod classifier;
pub mod config;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod util;
