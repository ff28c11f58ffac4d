pub mod in_memory;
pub mod platform;
pub mod retry;

pub use in_memory::{AdapterDataset, InMemoryAdapter, InMemoryAdapterFactory};
pub use platform::{AdapterFactory, AdapterResult, PlatformAdapter};
pub use retry::RetryPolicy;
