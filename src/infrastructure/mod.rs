pub mod directories;
pub mod logging;
pub mod shutdown;
pub mod token_store;
