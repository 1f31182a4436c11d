// Declare the modules to re-export
pub mod configs;
pub mod core;
pub mod errors;

// Re-export everything
pub use crate::configs::settings::*;
pub use crate::core::inventory::*;
pub use crate::core::ota::*;
pub use crate::core::registry::*;
pub use crate::core::sorting::*;
pub use crate::core::sync::*;
pub use crate::errors::*;
