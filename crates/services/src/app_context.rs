use std::sync::Arc;

use storage::identity::{IdentityProvider, LocalIdentityProvider};
use storage::repository::Storage;

use crate::Clock;
use crate::auth_service::AuthService;
use crate::catalog_service::CatalogService;
use crate::error::AppContextError;
use crate::progress_tracker::ProgressTracker;
use crate::session_context::SessionContext;

/// Assembles app-facing services over one storage backend and identity provider.
///
/// This replaces any process-wide client: whoever builds the context owns it
/// and hands it (or the services inside) to the code that needs them.
#[derive(Clone)]
pub struct AppContext {
    identity: Arc<dyn IdentityProvider>,
    auth: Arc<AuthService>,
    catalog: Arc<CatalogService>,
    tracker: Arc<ProgressTracker>,
}

impl AppContext {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, identity: Arc<dyn IdentityProvider>) -> Self {
        let auth = Arc::new(AuthService::new(Arc::clone(&identity)));
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.courses)));
        let tracker = Arc::new(ProgressTracker::new(
            clock,
            Arc::clone(&identity),
            Arc::clone(&storage.progress),
        ));
        Self {
            identity,
            auth,
            catalog,
            tracker,
        }
    }

    /// Context whose accounts live in the same backend as the progress data.
    #[must_use]
    pub fn with_local_identity(clock: Clock, storage: &Storage) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new(
            clock,
            Arc::clone(&storage.accounts),
        ));
        Self::new(clock, storage, identity)
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::with_local_identity(clock, &Storage::in_memory())
    }

    /// Build a context backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError` if storage initialization fails.
    pub async fn sqlite(
        db_url: &str,
        clock: Clock,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self, AppContextError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(match identity {
            Some(identity) => Self::new(clock, &storage, identity),
            None => Self::with_local_identity(clock, &storage),
        })
    }

    /// Opens a session that follows this context's identity provider.
    #[must_use]
    pub fn session(&self) -> SessionContext {
        SessionContext::new(Arc::clone(&self.identity), (*self.tracker).clone())
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }
}
