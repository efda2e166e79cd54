pub mod domain;
pub mod endpoint;
pub mod scan;
pub mod screenshot;
pub mod technology;
pub mod template;

// Re-export commonly used types
pub use domain::*;
pub use endpoint::*;
pub use scan::*;
pub use screenshot::*;
pub use technology::*;
pub use template::*;
