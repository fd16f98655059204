//! Composition root.
//!
//! # Responsibilities
//! - Turn options into a running, synchronized engine (`initialize`)
//! - Expose the operations the tray layer drives: selector changes,
//!   system proxy toggling, restart, shutdown
//!
//! # Design Decisions
//! - Everything that can be checked before spawning (config, mixed
//!   inbound, executable) is fatal; problems after spawning are warnings
//!   so the tray can still come up and show them
//! - The active config, control client and synchronizer are swapped as
//!   one unit on restart

use arc_swap::{ArcSwap, ArcSwapOption};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::loader::load_engine_config;
use crate::config::validation::validate_engine_config;
use crate::config::{ConfigError, DroverOptions, EngineConfig, TimeoutOptions};
use crate::control::{wait_until_ready, ControlPlaneClient, DispatchTicket, SelectionTask, SelectorSynchronizer};
use crate::engine::{resolve_executable, EngineError, EngineProcess, EngineState, StartOutcome, StopOutcome};
use crate::menu::{build_menu, MenuEntry};
use crate::system_proxy::SystemProxy;

/// Fatal supervisor errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Config-derived state that is replaced as a whole on restart.
struct ActiveEngine {
    config: Arc<EngineConfig>,
    client: ControlPlaneClient,
    sync: SelectorSynchronizer,
}

impl ActiveEngine {
    fn new(config: EngineConfig, timeouts: &TimeoutOptions) -> Self {
        let client = ControlPlaneClient::from_config(&config, timeouts.control_request());
        let sync = SelectorSynchronizer::spawn(client.clone());
        Self {
            config: Arc::new(config),
            client,
            sync,
        }
    }
}

/// Supervises one engine instance and keeps its selectors in sync.
pub struct Supervisor {
    options: DroverOptions,
    executable: PathBuf,
    engine: EngineProcess,
    active: ArcSwap<ActiveEngine>,
    system_proxy: Box<dyn SystemProxy>,
    proxy_enabled: AtomicBool,
    /// Set when `initialize` turned the system proxy on.
    proxy_auto_enabled: AtomicBool,
    start_warning: ArcSwapOption<String>,
    shut_down: AtomicBool,
}

impl Supervisor {
    /// Load and validate the engine config, locate the engine, start it and
    /// push selector defaults.
    ///
    /// Errors are returned only for problems found before anything is
    /// spawned. An engine that fails to launch or dies at once is reported
    /// through [`Supervisor::start_warning`].
    pub async fn initialize(options: DroverOptions, system_proxy: Box<dyn SystemProxy>) -> Result<Self, SupervisorError> {
        let config = load_engine_config(&options.config_path)?;
        validate_engine_config(&config)?;
        let executable = resolve_executable(&options.engine_dir)?;

        tracing::info!(
            config = %options.config_path.display(),
            executable = %executable.display(),
            proxy = %config.proxy_endpoint(),
            selectors = config.selectors.len(),
            system_proxy_backend = system_proxy.name(),
            "Configuration loaded"
        );

        let supervisor = Self {
            engine: EngineProcess::new(&options.timeouts),
            active: ArcSwap::from_pointee(ActiveEngine::new(config, &options.timeouts)),
            executable,
            options,
            system_proxy,
            proxy_enabled: AtomicBool::new(false),
            proxy_auto_enabled: AtomicBool::new(false),
            start_warning: ArcSwapOption::empty(),
            shut_down: AtomicBool::new(false),
        };

        supervisor.launch().await;

        if supervisor.options.system_proxy_auto && supervisor.enable_system_proxy() {
            supervisor.proxy_auto_enabled.store(true, Ordering::Release);
        }

        Ok(supervisor)
    }

    /// Start the engine for the active config and align selectors.
    async fn launch(&self) {
        let active = self.active.load_full();

        match self.engine.start(&self.executable, &self.options.config_path).await {
            Ok(StartOutcome::Running { .. }) => {
                self.start_warning.store(None);
                if !active.client.is_enabled() {
                    return;
                }
                if !wait_until_ready(&active.client, self.options.timeouts.readiness()).await {
                    tracing::warn!("Pushing selector defaults to a control plane that has not answered yet");
                }
                active.sync.apply_defaults(&active.config.selectors);
            }
            Ok(outcome) => {
                let message = outcome.diagnostic().unwrap_or_default();
                tracing::error!(message = %message, "Engine startup error captured");
                self.start_warning.store(Some(Arc::new(message)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Engine could not be started");
                self.start_warning.store(Some(Arc::new(e.to_string())));
            }
        }
    }

    /// Point `selector` at `outbound`. Returns immediately.
    pub fn change_selector(&self, selector: &str, outbound: &str) -> DispatchTicket {
        let active = self.active.load();
        if active.config.selector(selector).is_none() {
            tracing::debug!(selector = %selector, "Changing a selector not declared in the config");
        }
        tracing::info!(selector = %selector, outbound = %outbound, "Setting selector");
        active.sync.dispatch(vec![SelectionTask::new(selector, outbound)])
    }

    /// Route system traffic through the engine's mixed inbound.
    pub fn enable_system_proxy(&self) -> bool {
        let config = self.config();
        match self.system_proxy.enable(&config.proxy_host, config.proxy_port) {
            Ok(()) => {
                self.proxy_enabled.store(true, Ordering::Release);
                tracing::info!(proxy = %config.proxy_endpoint(), "System proxy enabled");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enable system proxy");
                false
            }
        }
    }

    /// Turn the system proxy off.
    ///
    /// A proxy turned back on afterwards is the user's, so shutdown leaves
    /// it alone.
    pub fn disable_system_proxy(&self) -> bool {
        match self.system_proxy.disable() {
            Ok(()) => {
                self.proxy_enabled.store(false, Ordering::Release);
                self.proxy_auto_enabled.store(false, Ordering::Release);
                tracing::info!("System proxy disabled");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to disable system proxy");
                false
            }
        }
    }

    /// Flip the system proxy; returns the resulting state.
    pub fn toggle_system_proxy(&self) -> bool {
        if self.is_system_proxy_enabled() {
            self.disable_system_proxy();
        } else {
            self.enable_system_proxy();
        }
        self.is_system_proxy_enabled()
    }

    /// Re-read the engine config and restart the engine with it.
    ///
    /// The new config is validated first; if it is broken the running
    /// engine is left alone and the error returned.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Ok(());
        }

        let config = load_engine_config(&self.options.config_path)?;
        validate_engine_config(&config)?;

        tracing::info!("Restarting engine with updated configuration");
        let previous = self.active.load_full();
        previous.sync.close();
        self.engine.stop().await;

        let endpoint_changed = previous.config.proxy_endpoint() != config.proxy_endpoint();
        self.active.store(Arc::new(ActiveEngine::new(config, &self.options.timeouts)));
        self.launch().await;

        if endpoint_changed && self.is_system_proxy_enabled() {
            self.enable_system_proxy();
        }
        Ok(())
    }

    /// Disable an auto-enabled system proxy and stop the engine.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&self) -> StopOutcome {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return StopOutcome::NotRunning;
        }

        tracing::info!("Shutting down");
        if self.proxy_auto_enabled.load(Ordering::Acquire) && self.is_system_proxy_enabled() {
            self.disable_system_proxy();
        }

        self.active.load().sync.close();
        self.engine.stop().await
    }

    /// Reap the engine if it died; returns the current state.
    pub async fn refresh_engine(&self) -> EngineState {
        self.engine.refresh().await
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Diagnostic from the last failed start, if any.
    pub fn start_warning(&self) -> Option<Arc<String>> {
        self.start_warning.load_full()
    }

    pub fn is_system_proxy_enabled(&self) -> bool {
        self.proxy_enabled.load(Ordering::Acquire)
    }

    /// The active engine config.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.active.load().config.clone()
    }

    pub fn options(&self) -> &DroverOptions {
        &self.options
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Selection to show for `selector`: last acknowledged change, else the
    /// declared default.
    pub fn current_selection(&self, selector: &str) -> Option<String> {
        let active = self.active.load();
        active.sync.applied(selector).or_else(|| {
            active
                .config
                .selector(selector)
                .and_then(|s| s.default_outbound())
                .map(str::to_string)
        })
    }

    /// Selection as reported by the engine right now.
    pub async fn live_selection(&self, selector: &str) -> Option<String> {
        let client = self.active.load().client.clone();
        client.selector_state(selector).await
    }

    /// Menu model for the tray.
    pub fn menu(&self) -> Vec<MenuEntry> {
        let config = self.config();
        build_menu(
            &config.selectors,
            self.options.menu_layout,
            self.is_system_proxy_enabled(),
            |s| self.current_selection(&s.name),
        )
    }
}
