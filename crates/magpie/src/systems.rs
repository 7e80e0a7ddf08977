pub mod knowledge;
pub mod remote;
pub mod system;
pub mod tracker;

pub use system::System;
