/*!
 * Model lifecycle management.
 *
 * Each inference role (ASR, forced aligner, translator, lookup) is bound to
 * at most one loaded model at a time. Jobs borrow a role's engine through a
 * lease that holds the role's lock; model switches wait behind in-flight
 * leases, unload the old engine before loading the new one, and persist the
 * new selection on success.
 */

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::app_config::{Config, ModelRole};
use crate::engines::{
    DictionaryLookup, EngineFactory, ForcedAligner, SpeechRecognizer, Translator,
};
use crate::errors::{AppError, AppResult};

/// A model the backend knows how to load
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ModelInfo {
    /// Stable model identifier
    pub id: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
}

/// Known models per role. Switching to an id outside this list is rejected.
pub fn available_models(role: ModelRole) -> &'static [ModelInfo] {
    match role {
        ModelRole::Asr => &[
            ModelInfo {
                id: "qwen3-asr-1.7b",
                display_name: "Qwen3 ASR 1.7B",
            },
            ModelInfo {
                id: "qwen3-asr-0.6b",
                display_name: "Qwen3 ASR 0.6B",
            },
        ],
        ModelRole::ForcedAligner => &[ModelInfo {
            id: "qwen3-forced-aligner-0.6b",
            display_name: "Qwen3 Forced Aligner 0.6B",
        }],
        ModelRole::Translator | ModelRole::Lookup => &[
            ModelInfo {
                id: "qwen3-1.7b",
                display_name: "Qwen3 1.7B",
            },
            ModelInfo {
                id: "qwen3-0.6b",
                display_name: "Qwen3 0.6B",
            },
            ModelInfo {
                id: "qwen3-4b",
                display_name: "Qwen3 4B",
            },
        ],
    }
}

/// Load state of a role, as reported by the models listing
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Listing entry for one role
#[derive(Debug, Clone, Serialize)]
pub struct RoleStatus {
    /// The role
    pub role: ModelRole,
    /// Currently selected model id
    pub selected_model: String,
    /// Whether the selected model is resident
    pub state: LoadState,
    /// Unix timestamp of the last lease on this role, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<i64>,
    /// Models this role can switch to
    pub available: Vec<ModelInfo>,
}

/// Slot state for one role, guarded by the role's lock
struct SlotState<T: ?Sized> {
    /// Loaded engine and the model id it was loaded from
    loaded: Option<(String, Arc<T>)>,
}

impl<T: ?Sized> Default for SlotState<T> {
    fn default() -> Self {
        Self { loaded: None }
    }
}

/// Lease on a role's engine
///
/// Holds the role's lock for its lifetime; drop it to let queued jobs and
/// model switches proceed.
pub struct EngineLease<'a, T: ?Sized> {
    _guard: MutexGuard<'a, SlotState<T>>,
    engine: Arc<T>,
    model_id: String,
}

impl<T: ?Sized> EngineLease<'_, T> {
    /// The leased engine
    pub fn engine(&self) -> &Arc<T> {
        &self.engine
    }

    /// Id of the model backing this lease
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Manages model selection and residency for all four roles
pub struct ModelManager {
    factory: Arc<dyn EngineFactory>,
    config: Arc<RwLock<Config>>,
    config_path: Option<PathBuf>,

    asr: Mutex<SlotState<dyn SpeechRecognizer>>,
    aligner: Mutex<SlotState<dyn ForcedAligner>>,
    translator: Mutex<SlotState<dyn Translator>>,
    lookup: Mutex<SlotState<dyn DictionaryLookup>>,

    /// Lock-free view of each role's state for the models listing
    states: RwLock<[LoadState; 4]>,
    /// Unix timestamp of the last lease per role
    last_used: RwLock<[Option<i64>; 4]>,
}

impl ModelManager {
    /// Create a manager with no models resident yet
    ///
    /// `config_path` is rewritten after each successful switch; pass `None`
    /// to keep selections in memory only (tests).
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        config: Arc<RwLock<Config>>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            factory,
            config,
            config_path,
            asr: Mutex::new(SlotState::default()),
            aligner: Mutex::new(SlotState::default()),
            translator: Mutex::new(SlotState::default()),
            lookup: Mutex::new(SlotState::default()),
            states: RwLock::new([LoadState::Unloaded; 4]),
            last_used: RwLock::new([None; 4]),
        }
    }

    /// Currently selected model id for a role
    pub fn selected_model(&self, role: ModelRole) -> String {
        self.config.read().models.get(role).to_string()
    }

    fn set_state(&self, role: ModelRole, state: LoadState) {
        self.states.write()[role_index(role)] = state;
    }

    fn mark_used(&self, role: ModelRole) {
        self.last_used.write()[role_index(role)] = Some(chrono::Utc::now().timestamp());
    }

    /// Listing of all roles with their selection, state and alternatives
    pub fn list_models(&self) -> Vec<RoleStatus> {
        let states = *self.states.read();
        let last_used = *self.last_used.read();
        let config = self.config.read();
        ModelRole::ALL
            .iter()
            .map(|&role| RoleStatus {
                role,
                selected_model: config.models.get(role).to_string(),
                state: states[role_index(role)],
                last_used_at: last_used[role_index(role)],
                available: available_models(role).to_vec(),
            })
            .collect()
    }

    /// Borrow the ASR engine, loading the selected model first if needed
    pub async fn acquire_recognizer(&self) -> AppResult<EngineLease<'_, dyn SpeechRecognizer>> {
        let mut guard = self.asr.lock().await;
        let selected = self.selected_model(ModelRole::Asr);
        if !slot_matches(&guard, &selected) {
            self.unload_slot(&mut guard, ModelRole::Asr);
            self.set_state(ModelRole::Asr, LoadState::Loading);
            let engine = match self.factory.load_recognizer(&selected).await {
                Ok(engine) => engine,
                Err(err) => {
                    self.set_state(ModelRole::Asr, LoadState::Unloaded);
                    return Err(err.into());
                }
            };
            guard.loaded = Some((selected.clone(), engine));
            self.set_state(ModelRole::Asr, LoadState::Loaded);
            info!("Loaded model '{}' for role asr", selected);
        }
        self.mark_used(ModelRole::Asr);
        Ok(make_lease(guard))
    }

    /// Borrow the forced-aligner engine
    pub async fn acquire_aligner(&self) -> AppResult<EngineLease<'_, dyn ForcedAligner>> {
        let mut guard = self.aligner.lock().await;
        let selected = self.selected_model(ModelRole::ForcedAligner);
        if !slot_matches(&guard, &selected) {
            self.unload_slot(&mut guard, ModelRole::ForcedAligner);
            self.set_state(ModelRole::ForcedAligner, LoadState::Loading);
            let engine = match self.factory.load_aligner(&selected).await {
                Ok(engine) => engine,
                Err(err) => {
                    self.set_state(ModelRole::ForcedAligner, LoadState::Unloaded);
                    return Err(err.into());
                }
            };
            guard.loaded = Some((selected.clone(), engine));
            self.set_state(ModelRole::ForcedAligner, LoadState::Loaded);
            info!("Loaded model '{}' for role forced_aligner", selected);
        }
        self.mark_used(ModelRole::ForcedAligner);
        Ok(make_lease(guard))
    }

    /// Borrow the translator engine
    ///
    /// Translation jobs re-acquire this per segment so a queued model switch
    /// can cut in between segments.
    pub async fn acquire_translator(&self) -> AppResult<EngineLease<'_, dyn Translator>> {
        let mut guard = self.translator.lock().await;
        let selected = self.selected_model(ModelRole::Translator);
        if !slot_matches(&guard, &selected) {
            self.unload_slot(&mut guard, ModelRole::Translator);
            self.set_state(ModelRole::Translator, LoadState::Loading);
            let engine = match self.factory.load_translator(&selected).await {
                Ok(engine) => engine,
                Err(err) => {
                    self.set_state(ModelRole::Translator, LoadState::Unloaded);
                    return Err(err.into());
                }
            };
            guard.loaded = Some((selected.clone(), engine));
            self.set_state(ModelRole::Translator, LoadState::Loaded);
            info!("Loaded model '{}' for role translator", selected);
        }
        self.mark_used(ModelRole::Translator);
        Ok(make_lease(guard))
    }

    /// Borrow the dictionary lookup engine
    pub async fn acquire_lookup(&self) -> AppResult<EngineLease<'_, dyn DictionaryLookup>> {
        let mut guard = self.lookup.lock().await;
        let selected = self.selected_model(ModelRole::Lookup);
        if !slot_matches(&guard, &selected) {
            self.unload_slot(&mut guard, ModelRole::Lookup);
            self.set_state(ModelRole::Lookup, LoadState::Loading);
            let engine = match self.factory.load_lookup(&selected).await {
                Ok(engine) => engine,
                Err(err) => {
                    self.set_state(ModelRole::Lookup, LoadState::Unloaded);
                    return Err(err.into());
                }
            };
            guard.loaded = Some((selected.clone(), engine));
            self.set_state(ModelRole::Lookup, LoadState::Loaded);
            info!("Loaded model '{}' for role lookup", selected);
        }
        self.mark_used(ModelRole::Lookup);
        Ok(make_lease(guard))
    }

    /// Switch a role to a different model
    ///
    /// Waits for in-flight leases on the role, unloads the old engine before
    /// the new one is loaded, and persists the selection on success. A
    /// failed load leaves the role unloaded and the old selection in place.
    pub async fn switch_model(&self, role: ModelRole, model_id: &str) -> AppResult<RoleStatus> {
        if !available_models(role).iter().any(|m| m.id == model_id) {
            return Err(AppError::InvalidModel(format!(
                "unknown model '{}' for role '{}'",
                model_id, role
            )));
        }

        // A switch to the current selection changes nothing; residency is
        // left to the next acquire
        if self.selected_model(role) == model_id {
            debug!("Role {} already selects model '{}'", role, model_id);
            return self.role_status(role);
        }

        match role {
            ModelRole::Asr => {
                let guard = self.asr.lock().await;
                self.switch_slot(guard, role, model_id, |factory, id| async move {
                    factory.load_recognizer(&id).await
                })
                .await?
            }
            ModelRole::ForcedAligner => {
                let guard = self.aligner.lock().await;
                self.switch_slot(guard, role, model_id, |factory, id| async move {
                    factory.load_aligner(&id).await
                })
                .await?
            }
            ModelRole::Translator => {
                let guard = self.translator.lock().await;
                self.switch_slot(guard, role, model_id, |factory, id| async move {
                    factory.load_translator(&id).await
                })
                .await?
            }
            ModelRole::Lookup => {
                let guard = self.lookup.lock().await;
                self.switch_slot(guard, role, model_id, |factory, id| async move {
                    factory.load_lookup(&id).await
                })
                .await?
            }
        }

        self.role_status(role)
    }

    fn role_status(&self, role: ModelRole) -> AppResult<RoleStatus> {
        self.list_models()
            .into_iter()
            .find(|s| s.role == role)
            .ok_or_else(|| AppError::InvalidModel(format!("unknown role '{}'", role)))
    }

    async fn switch_slot<T, F, Fut>(
        &self,
        mut guard: MutexGuard<'_, SlotState<T>>,
        role: ModelRole,
        model_id: &str,
        load: F,
    ) -> AppResult<()>
    where
        T: ?Sized,
        F: FnOnce(Arc<dyn EngineFactory>, String) -> Fut,
        Fut: std::future::Future<Output = Result<Arc<T>, crate::errors::EngineError>>,
    {
        self.unload_slot(&mut guard, role);
        self.set_state(role, LoadState::Loading);

        match load(Arc::clone(&self.factory), model_id.to_string()).await {
            Ok(engine) => {
                guard.loaded = Some((model_id.to_string(), engine));
                self.set_state(role, LoadState::Loaded);
                self.persist_selection(role, model_id);
                info!("Switched role {} to model '{}'", role, model_id);
                Ok(())
            }
            Err(err) => {
                self.set_state(role, LoadState::Unloaded);
                warn!("Load failed while switching role {}: {}", role, err);
                Err(err.into())
            }
        }
    }

    fn unload_slot<T: ?Sized>(&self, guard: &mut MutexGuard<'_, SlotState<T>>, role: ModelRole) {
        if let Some((old_id, engine)) = guard.loaded.take() {
            drop(engine);
            self.set_state(role, LoadState::Unloaded);
            info!("Unloaded model '{}' from role {}", old_id, role);
        }
    }

    fn persist_selection(&self, role: ModelRole, model_id: &str) {
        let snapshot = {
            let mut config = self.config.write();
            config.models.set(role, model_id.to_string());
            config.clone()
        };
        if let Some(path) = &self.config_path {
            if let Err(err) = snapshot.save(path) {
                warn!("Failed to persist model selection: {:#}", err);
            }
        }
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("states", &*self.states.read())
            .finish_non_exhaustive()
    }
}

fn role_index(role: ModelRole) -> usize {
    match role {
        ModelRole::Asr => 0,
        ModelRole::ForcedAligner => 1,
        ModelRole::Translator => 2,
        ModelRole::Lookup => 3,
    }
}

fn slot_matches<T: ?Sized>(guard: &MutexGuard<'_, SlotState<T>>, selected: &str) -> bool {
    guard
        .loaded
        .as_ref()
        .is_some_and(|(id, _)| id.as_str() == selected)
}

fn make_lease<T: ?Sized>(guard: MutexGuard<'_, SlotState<T>>) -> EngineLease<'_, T> {
    // Caller guarantees the slot is populated
    let (model_id, engine) = guard
        .loaded
        .as_ref()
        .map(|(id, engine)| (id.clone(), Arc::clone(engine)))
        .unwrap_or_else(|| unreachable!("lease taken from an empty slot"));
    EngineLease {
        _guard: guard,
        engine,
        model_id,
    }
}
