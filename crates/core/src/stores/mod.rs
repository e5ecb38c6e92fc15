pub mod local;

pub use local::LocalStore;
