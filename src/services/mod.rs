pub mod external;
pub mod pipeline;
pub mod scan_service;
pub mod task_manager;

// Re-export commonly used types
pub use scan_service::ScanService;
pub use task_manager::{TaskManager, TaskType};
