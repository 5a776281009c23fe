pub mod code;
pub mod compile;

pub use code::{Code, Opcode};
pub use compile::compile;
