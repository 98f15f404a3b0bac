//! Warm restart of services.
//!
//! A warm restart hands the state of a service over to its replacement. The
//! service is quiesced before its container is swapped, afterwards the new
//! instance reports through the state store once it has reconciled its state.

use std::fmt;
use std::thread;

use tracing::{debug, info, warn};

use super::runtime::ContainerRuntime;
use super::ContainerName;
use crate::config::WarmRestartConfig;
use crate::error::{SwixError, SwixResult};

/// Reconciliation state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmRestartState {
    Absent,
    InProgress,
    Reconciled,
    Failed,
}

impl WarmRestartState {
    /// Interpret the stored `state` field.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => WarmRestartState::Absent,
            Some("reconciled") => WarmRestartState::Reconciled,
            Some("failed") => WarmRestartState::Failed,
            Some(_) => WarmRestartState::InProgress,
        }
    }
}

/// Keys of the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey<'k> {
    /// Warm restart flag of a service.
    Enable(ContainerName),
    /// Reconciliation state of an application.
    App(&'k str),
}

impl StateKey<'_> {
    /// Field of the hash holding the value.
    pub fn field(&self) -> &'static str {
        match self {
            StateKey::Enable(_) => "enable",
            StateKey::App(_) => "state",
        }
    }
}

impl fmt::Display for StateKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::Enable(service) => write!(f, "WARM_RESTART_ENABLE_TABLE|{service}"),
            StateKey::App(app) => write!(f, "WARM_RESTART_TABLE|{app}"),
        }
    }
}

/// Shared store of warm restart flags and reconciliation states.
pub trait WarmRestartStore: fmt::Debug {
    fn is_enabled(&self, service: ContainerName) -> SwixResult<bool>;

    fn set_enabled(&self, service: ContainerName, enabled: bool) -> SwixResult<()>;

    fn app_state(&self, app: &str) -> SwixResult<WarmRestartState>;

    /// Reset the state of the application to absent.
    fn clear_app_state(&self, app: &str) -> SwixResult<()>;
}

/// State store kept in Redis inside the database container.
#[derive(Debug)]
pub struct RedisStore<'r> {
    runtime: &'r dyn ContainerRuntime,
    container: String,
    db: String,
}

impl<'r> RedisStore<'r> {
    pub fn new(runtime: &'r dyn ContainerRuntime, config: &WarmRestartConfig) -> Self {
        Self {
            runtime,
            container: config.database_container.clone(),
            db: config.state_db.to_string(),
        }
    }

    fn redis(&self, args: &[&str]) -> SwixResult<String> {
        let mut command = vec!["redis-cli", "-n", self.db.as_str()];
        command.extend_from_slice(args);
        self.runtime.exec(&self.container, &command)
    }
}

impl WarmRestartStore for RedisStore<'_> {
    fn is_enabled(&self, service: ContainerName) -> SwixResult<bool> {
        let key = StateKey::Enable(service);
        let value = self.redis(&["hget", key.to_string().as_str(), key.field()])?;
        Ok(value.trim() == "true")
    }

    fn set_enabled(&self, service: ContainerName, enabled: bool) -> SwixResult<()> {
        let key = StateKey::Enable(service);
        let value = if enabled { "true" } else { "false" };
        self.redis(&["hset", key.to_string().as_str(), key.field(), value])
            .map(|_| ())
    }

    fn app_state(&self, app: &str) -> SwixResult<WarmRestartState> {
        let key = StateKey::App(app);
        let value = self.redis(&["hget", key.to_string().as_str(), key.field()])?;
        Ok(WarmRestartState::from_field(Some(&value)))
    }

    fn clear_app_state(&self, app: &str) -> SwixResult<()> {
        let key = StateKey::App(app);
        self.redis(&["hdel", key.to_string().as_str(), key.field()])
            .map(|_| ())
    }
}

/// Warm restart in progress for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmSession {
    pub service: ContainerName,
    pub app: &'static str,
    /// The flag has been enabled for this upgrade only.
    restore_flag: bool,
}

/// Outcome of waiting for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Reconciled { polls: u32 },
    TimedOut { polls: u32 },
}

impl Reconciliation {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Reconciliation::Reconciled { .. })
    }
}

/// Drives the warm restart protocol of a service.
#[derive(Debug, Clone, Copy)]
pub struct WarmRestartCoordinator<'c> {
    store: &'c dyn WarmRestartStore,
    runtime: &'c dyn ContainerRuntime,
    config: &'c WarmRestartConfig,
}

impl<'c> WarmRestartCoordinator<'c> {
    pub fn new(
        store: &'c dyn WarmRestartStore,
        runtime: &'c dyn ContainerRuntime,
        config: &'c WarmRestartConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
        }
    }

    /// Start a warm restart if requested or configured for the service.
    ///
    /// Returns `None` if the service is restarted cold.
    pub fn begin(
        &self,
        service: ContainerName,
        requested: bool,
    ) -> SwixResult<Option<WarmSession>> {
        let Some(app) = service.warm_restart_app() else {
            if requested {
                return Err(SwixError::Precondition
                    .report(format!("service {service} does not support warm restarts")));
            }
            return Ok(None);
        };
        let configured = self.store.is_enabled(service)?;
        if !configured && !requested {
            return Ok(None);
        }
        if !configured {
            info!("enabling warm restart of {service} for this upgrade");
            self.store.set_enabled(service, true)?;
        }
        Ok(Some(WarmSession {
            service,
            app,
            restore_flag: !configured,
        }))
    }

    /// Bring the service into a state in which it can be swapped.
    pub fn quiesce(&self, session: &WarmSession, enforce_check: bool) -> SwixResult<()> {
        let service = session.service.as_str();
        match session.service {
            ContainerName::Swss => self.freeze_orchagent(enforce_check)?,
            ContainerName::Bgp => {
                info!("stopping bgp");
                self.runtime.exec(service, &["pkill", "-9", "zebra"])?;
                self.runtime.exec(service, &["pkill", "-9", "bgpd"])?;
                thread::sleep(self.config.agent_settle());
            }
            ContainerName::Teamd => {
                info!("stopping teamd");
                self.runtime.exec(service, &["pkill", "-USR1", "teamd"])?;
                thread::sleep(self.config.agent_settle());
            }
            _ => {}
        }
        self.store.clear_app_state(session.app)
    }

    fn freeze_orchagent(&self, enforce_check: bool) -> SwixResult<()> {
        let mut args = vec!["orchagent_restart_check", "-w", "1000"];
        if !enforce_check {
            args.push("-s");
        }
        // The check runs at least once.
        let attempts = self.config.quiesce_attempts.max(1);
        for attempt in 1..=attempts {
            match self.runtime.exec(ContainerName::Swss.as_str(), &args) {
                Ok(_) => {
                    info!("orchagent is in clean state and frozen for warm upgrade");
                    return Ok(());
                }
                Err(_) if !enforce_check => {
                    warn!("orchagent is not in clean state, upgrading it anyway");
                    return Ok(());
                }
                Err(report) => {
                    warn!("orchagent is not in clean state, restart check {attempt} failed");
                    if attempt == attempts {
                        return Err(report);
                    }
                    thread::sleep(self.config.quiesce_backoff());
                }
            }
        }
        Ok(())
    }

    /// Wait until the restarted service reports its state as reconciled.
    pub fn await_reconciliation(&self, session: &WarmSession) -> Reconciliation {
        let attempts = self.config.poll_attempts;
        for poll in 1..=attempts {
            thread::sleep(self.config.poll_interval());
            match self.store.app_state(session.app) {
                Ok(WarmRestartState::Reconciled) => {
                    info!("{} reconciled after {poll} polls", session.app);
                    return Reconciliation::Reconciled { polls: poll };
                }
                Ok(state) => {
                    debug!("{} is in state {state:?} ({poll}/{attempts})", session.app);
                }
                Err(report) => {
                    warn!("unable to read state of {}: {report:?}", session.app);
                }
            }
        }
        warn!("{} failed to reach reconciled state", session.app);
        Reconciliation::TimedOut { polls: attempts }
    }

    /// Restore the warm restart flag of the service.
    pub fn finish(&self, session: &WarmSession) -> SwixResult<()> {
        if session.restore_flag {
            info!("disabling warm restart of {}", session.service);
            self.store.set_enabled(session.service, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::testing::{FakeRuntime, FakeStore};

    fn config() -> WarmRestartConfig {
        WarmRestartConfig {
            quiesce_backoff_secs: 0,
            agent_settle_secs: 0,
            poll_interval_secs: 0,
            ..WarmRestartConfig::default()
        }
    }

    #[test]
    fn test_state_keys() {
        assert_eq!(
            StateKey::Enable(ContainerName::Swss).to_string(),
            "WARM_RESTART_ENABLE_TABLE|swss"
        );
        assert_eq!(
            StateKey::App("orchagent").to_string(),
            "WARM_RESTART_TABLE|orchagent"
        );
        assert_eq!(StateKey::App("bgp").field(), "state");
    }

    #[test]
    fn test_state_from_field() {
        assert_eq!(WarmRestartState::from_field(None), WarmRestartState::Absent);
        assert_eq!(WarmRestartState::from_field(Some("\n")), WarmRestartState::Absent);
        assert_eq!(
            WarmRestartState::from_field(Some("reconciled\n")),
            WarmRestartState::Reconciled
        );
        assert_eq!(
            WarmRestartState::from_field(Some("restored")),
            WarmRestartState::InProgress
        );
    }

    #[test]
    fn test_redis_commands() {
        let runtime = FakeRuntime::default();
        let store = RedisStore::new(&runtime, &WarmRestartConfig::default());
        store.clear_app_state("teamsyncd").unwrap();
        store.set_enabled(ContainerName::Bgp, true).unwrap();
        assert!(runtime.logged(
            "exec database redis-cli -n 6 hdel WARM_RESTART_TABLE|teamsyncd state"
        ));
        assert!(runtime.logged(
            "exec database redis-cli -n 6 hset WARM_RESTART_ENABLE_TABLE|bgp enable true"
        ));
    }

    #[test]
    fn test_begin_and_finish() {
        let runtime = FakeRuntime::default();
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        assert_eq!(coordinator.begin(ContainerName::Swss, false).unwrap(), None);
        let session = coordinator.begin(ContainerName::Swss, true).unwrap().unwrap();
        assert!(store.is_enabled(ContainerName::Swss).unwrap());
        coordinator.finish(&session).unwrap();
        assert!(!store.is_enabled(ContainerName::Swss).unwrap());

        store.set_enabled(ContainerName::Bgp, true).unwrap();
        let session = coordinator.begin(ContainerName::Bgp, false).unwrap().unwrap();
        coordinator.finish(&session).unwrap();
        assert!(store.is_enabled(ContainerName::Bgp).unwrap());
    }

    #[test]
    fn test_begin_rejects_cold_services() {
        let runtime = FakeRuntime::default();
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let report = coordinator.begin(ContainerName::Lldp, true).unwrap_err();
        assert_eq!(report.error(), &SwixError::Precondition);
        assert_eq!(coordinator.begin(ContainerName::Lldp, false).unwrap(), None);
    }

    #[test]
    fn test_quiesce_swss() {
        let runtime = FakeRuntime::default();
        runtime
            .exec_failures
            .borrow_mut()
            .insert("orchagent_restart_check".to_owned(), 2);
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Swss, true).unwrap().unwrap();
        coordinator.quiesce(&session, true).unwrap();
        assert_eq!(runtime.log.borrow().len(), 3);
        assert!(runtime.logged("exec swss orchagent_restart_check -w 1000"));
        assert_eq!(*store.cleared.borrow(), ["orchagent"]);
    }

    #[test]
    fn test_quiesce_swss_enforced_failure() {
        let runtime = FakeRuntime::default();
        runtime
            .exec_failures
            .borrow_mut()
            .insert("orchagent_restart_check".to_owned(), 5);
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Swss, true).unwrap().unwrap();
        let report = coordinator.quiesce(&session, true).unwrap_err();
        assert_eq!(report.error(), &SwixError::ExternalTool { status: Some(2) });
        assert_eq!(runtime.log.borrow().len(), 5);
        assert!(store.cleared.borrow().is_empty());
    }

    #[test]
    fn test_quiesce_swss_checks_at_least_once() {
        let runtime = FakeRuntime::default();
        runtime
            .exec_failures
            .borrow_mut()
            .insert("orchagent_restart_check".to_owned(), 1);
        let store = FakeStore::default();
        let config = WarmRestartConfig {
            quiesce_attempts: 0,
            ..config()
        };
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Swss, true).unwrap().unwrap();
        let report = coordinator.quiesce(&session, true).unwrap_err();
        assert_eq!(report.error(), &SwixError::ExternalTool { status: Some(2) });
        assert_eq!(runtime.log.borrow().len(), 1);
    }

    #[test]
    fn test_quiesce_swss_unenforced_failure() {
        let runtime = FakeRuntime::default();
        runtime
            .exec_failures
            .borrow_mut()
            .insert("orchagent_restart_check".to_owned(), 5);
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Swss, true).unwrap().unwrap();
        coordinator.quiesce(&session, false).unwrap();
        assert_eq!(*runtime.log.borrow(), ["exec swss orchagent_restart_check -w 1000 -s"]);
    }

    #[test]
    fn test_quiesce_bgp() {
        let runtime = FakeRuntime::default();
        let store = FakeStore::default();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Bgp, true).unwrap().unwrap();
        coordinator.quiesce(&session, false).unwrap();
        assert_eq!(
            *runtime.log.borrow(),
            ["exec bgp pkill -9 zebra", "exec bgp pkill -9 bgpd"]
        );
        assert_eq!(*store.cleared.borrow(), ["bgp"]);
    }

    #[test]
    fn test_reconciled_after_polls() {
        let runtime = FakeRuntime::default();
        let store = FakeStore::reconciling_after(7);
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Teamd, true).unwrap().unwrap();
        assert_eq!(
            coordinator.await_reconciliation(&session),
            Reconciliation::Reconciled { polls: 7 }
        );
        assert_eq!(*store.reads.borrow(), 7);
    }

    #[test]
    fn test_reconciliation_times_out() {
        let runtime = FakeRuntime::default();
        let store = FakeStore::never_reconciling();
        let config = config();
        let coordinator = WarmRestartCoordinator::new(&store, &runtime, &config);
        let session = coordinator.begin(ContainerName::Teamd, true).unwrap().unwrap();
        assert_eq!(
            coordinator.await_reconciliation(&session),
            Reconciliation::TimedOut { polls: 90 }
        );
        assert_eq!(*store.reads.borrow(), 90);
    }
}
