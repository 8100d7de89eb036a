pub mod core;

pub use self::core::{CompositionError, CompositionResult};
