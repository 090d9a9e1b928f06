mod futures;
mod sync;

pub use futures::AsyncAside;
pub use sync::Aside;
