mod pipeline;
mod textir;

pub use pipeline::Driver;
pub use textir::parse_module;
