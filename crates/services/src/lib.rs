#![forbid(unsafe_code)]

pub mod app_context;
pub mod auth_service;
pub mod catalog_service;
pub mod error;
pub mod progress_tracker;
pub mod progress_view;
pub mod session_context;

pub use course_core::Clock;

pub use app_context::AppContext;
pub use auth_service::AuthService;
pub use catalog_service::CatalogService;
pub use error::{AppContextError, AuthError, CatalogError, ProgressError};
pub use progress_tracker::{ProgressTracker, ToggleOutcome};
pub use progress_view::ProgressView;
pub use session_context::SessionContext;
