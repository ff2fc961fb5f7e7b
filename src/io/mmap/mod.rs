mod arena;
pub use arena::Arena;

mod stream;
pub use stream::Stream;
