//! Usage: Wire settings into the long-lived services (backend, controller, repository).

use crate::app_paths;
use crate::auth::controller::{AuthFlowController, AuthFlowOptions};
use crate::auth::events::AuthEvents;
use crate::auth::identity::IdentityBackend;
use crate::auth::session_store::SessionStore;
use crate::auth::supabase::SupabaseAuth;
use crate::auth::web_auth::{AuthRuntime, LoopbackAuthRuntime};
use crate::domain::notes::NotesRepository;
use crate::infra::settings::AppSettings;
use crate::infra::storage::{FileStorage, KeyValueStorage};
use crate::infra::supabase_http::SupabaseProject;
use crate::shared::error::AppResult;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AuthFlowController>,
    pub notes: NotesRepository,
    pub events: AuthEvents,
}

impl AppState {
    /// Production wiring: Supabase backend, loopback runtime, file storage.
    pub fn bootstrap(data_dir: &Path, settings: &AppSettings) -> AppResult<Self> {
        let project = SupabaseProject::from_settings(settings)?;
        let storage = Arc::new(FileStorage::new(app_paths::storage_path(data_dir)));
        let runtime = Arc::new(LoopbackAuthRuntime::from_settings(settings));
        tracing::info!(
            supabase_url = %settings.supabase_url.trim(),
            provider = %settings.oauth_provider,
            callback_port = settings.callback_port,
            "app state bootstrapped"
        );
        Ok(Self::assemble(settings, project, storage, runtime))
    }

    pub fn assemble(
        settings: &AppSettings,
        project: SupabaseProject,
        storage: Arc<dyn KeyValueStorage>,
        runtime: Arc<dyn AuthRuntime>,
    ) -> Self {
        let backend: Arc<dyn IdentityBackend> = Arc::new(SupabaseAuth::new(project.clone()));
        let events = AuthEvents::new();
        let controller = AuthFlowController::new(
            backend.clone(),
            runtime,
            SessionStore::new(storage),
            events.clone(),
            AuthFlowOptions::from_settings(settings),
        );

        Self {
            controller: Arc::new(controller),
            notes: NotesRepository::new(project, backend),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::codes;

    #[test]
    fn bootstrap_requires_backend_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppState::bootstrap(dir.path(), &AppSettings::default())
            .err()
            .expect("missing url");
        assert!(err.is(codes::CONFIG_ERROR));
    }

    #[test]
    fn bootstrap_wires_configured_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = AppSettings {
            supabase_url: "https://demo.supabase.co".to_string(),
            supabase_anon_key: "anon".to_string(),
            ..AppSettings::default()
        };
        let state = AppState::bootstrap(dir.path(), &settings).expect("bootstrap");
        assert_eq!(
            state.controller.flow_state(),
            crate::auth::controller::AuthFlowState::Idle
        );
    }
}
