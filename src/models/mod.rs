pub mod task;
pub mod subtitle;
pub mod transcript;

pub use task::*;
pub use subtitle::*;
pub use transcript::*;
