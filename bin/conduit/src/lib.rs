pub mod cli;
pub mod node;
pub mod utils;
