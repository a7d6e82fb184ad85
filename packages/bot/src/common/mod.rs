pub mod logging;
pub mod secret;

pub use logging::init_tracing;
pub use secret::SecretString;
