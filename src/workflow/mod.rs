pub mod compositor;
pub mod dispatcher;
pub mod gate;
pub mod types;
pub mod watcher;
