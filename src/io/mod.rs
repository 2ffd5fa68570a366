pub mod activity;
pub mod export;

pub use activity::*;
pub use export::*;
