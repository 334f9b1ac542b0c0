/// The pool of fixed-size data blocks.
mod block_pool;

pub use block_pool::*;
