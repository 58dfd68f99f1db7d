pub mod payments;
pub mod stripe;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
