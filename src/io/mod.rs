pub mod keyboard;
pub mod output;
pub mod sink;
