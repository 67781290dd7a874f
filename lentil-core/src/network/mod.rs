pub mod observer;
pub mod transport;

pub use observer::{NoopObserver, Observer, TracingObserver};
pub use transport::Transport;
