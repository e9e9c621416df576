//! Tasks — the record model and the file-backed store.

pub mod model;
pub mod store;

pub use model::{CreateTaskRequest, Task, TaskStatus};
pub use store::TaskStore;
