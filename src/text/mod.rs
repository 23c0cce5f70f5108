pub mod reader;
pub mod speaker;
pub mod tokens;

pub use reader::*;
pub use speaker::*;
pub use tokens::*;
