//! Role registry: lookup, search and lock-guarded saves over a backend.
//!
//! ## Save protocol
//!
//! 1. Bump the role's revision for its barclamp (0 on first save).
//! 2. Acquire the named lock `role:<name>`.
//! 3. Re-read the persisted role and compare revisions.
//! 4. Write, then release the lock (the guard releases on every path).
//!
//! Different barclamps write disjoint sub-mappings of a role, so the lock
//! and revision check only matter for writers of the same barclamp. The lock
//! covers exactly one role name; `destroy` does not take it.

use super::Role;
use crate::backend::{ConfigBackend, escape_query};
use crate::lock::{LockGuard, LockService};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What `save` does when the persisted revision shows another writer got in first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPolicy {
    /// Report the race and write anyway (last writer wins)
    #[default]
    Warn,
    /// Compare-and-swap: refuse the write unless the persisted revision is
    /// exactly the one the caller started from
    Reject,
}

impl RevisionPolicy {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "reject" | "cas" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for RevisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected concurrent write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionRace {
    pub role: String,
    pub barclamp: String,
    /// Revision found in the backend
    pub observed: u64,
    /// Revision this save wrote
    pub written: u64,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<RevisionRace>,
}

/// A live deployment of a barclamp, found through its `<barclamp>-config-<instance>` role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveProposal {
    pub barclamp: String,
    pub instance: String,
}

impl fmt::Display for ActiveProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.barclamp, self.instance)
    }
}

/// CRUD and search over roles.
#[derive(Clone)]
pub struct RoleRegistry {
    backend: Arc<dyn ConfigBackend>,
    locks: Arc<dyn LockService>,
    policy: RevisionPolicy,
}

impl RoleRegistry {
    pub fn new(backend: Arc<dyn ConfigBackend>, locks: Arc<dyn LockService>) -> Self {
        Self {
            backend,
            locks,
            policy: RevisionPolicy::default(),
        }
    }

    /// Use a different revision policy.
    pub fn with_policy(mut self, policy: RevisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RevisionPolicy {
        self.policy
    }

    /// Load a role by name. A missing role is `Ok(None)`.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        match self.backend.load_role(name) {
            Ok(raw) => Role::from_value(raw).map(Some),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Search roles, keeping backend order. Rows that do not parse as roles
    /// are skipped.
    pub fn find_by_search(&self, query: Option<&str>) -> Result<Vec<Role>> {
        let response = self.backend.search_roles(query)?;
        if response.total == 0 {
            return Ok(Vec::new());
        }

        Ok(response
            .rows
            .into_iter()
            .filter_map(|row| match Role::from_value(row) {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::debug!("Skipping malformed role record: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Every role in the backend.
    pub fn all(&self) -> Result<Vec<Role>> {
        self.find_by_search(None)
    }

    /// Live proposals, optionally narrowed to one barclamp (and instance).
    ///
    /// The instance filter only applies together with a barclamp.
    pub fn list_active(
        &self,
        barclamp: Option<&str>,
        instance: Option<&str>,
    ) -> Result<Vec<ActiveProposal>> {
        let separator = escape_query("-config-");
        let pattern = match barclamp {
            None => format!("*{}*", separator),
            Some(barclamp) => format!(
                "{}{}{}",
                escape_query(barclamp),
                separator,
                instance.map(escape_query).unwrap_or_else(|| "*".to_string())
            ),
        };

        Ok(self
            .find_by_search(Some(&format!("name:{}", pattern)))?
            .into_iter()
            .map(|role| ActiveProposal {
                barclamp: role.barclamp(),
                instance: role.instance(),
            })
            .collect())
    }

    /// Persist a role, bumping its barclamp revision.
    ///
    /// On failure the role's in-memory revision is put back to what it was.
    pub fn save(&self, role: &mut Role) -> Result<SaveOutcome> {
        let barclamp = role.barclamp();
        let (prior, next) = role.bump_revision(&barclamp)?;
        tracing::debug!("Saving role: {} - {}", role.name(), next);

        match self.save_locked(role, &barclamp, prior, next) {
            Ok(race) => {
                tracing::debug!("Done saving role: {} - {}", role.name(), next);
                Ok(SaveOutcome {
                    revision: next,
                    race,
                })
            }
            Err(e) => {
                role.restore_revision(&barclamp, prior);
                Err(e)
            }
        }
    }

    fn save_locked(
        &self,
        role: &Role,
        barclamp: &str,
        prior: Option<u64>,
        next: u64,
    ) -> Result<Option<RevisionRace>> {
        let _guard = LockGuard::acquire(self.locks.as_ref(), &format!("role:{}", role.name()))?;

        let observed = self
            .find_by_name(role.name())?
            .and_then(|persisted| persisted.revision_for(barclamp));

        let race = match observed {
            Some(observed) if observed >= next => Some(RevisionRace {
                role: role.name().to_string(),
                barclamp: barclamp.to_string(),
                observed,
                written: next,
            }),
            _ => None,
        };

        match self.policy {
            RevisionPolicy::Warn => {
                if let Some(race) = &race {
                    tracing::warn!(
                        "Revision race for role {} (previous revision {}, writing {})",
                        race.role,
                        race.observed,
                        race.written
                    );
                }
            }
            RevisionPolicy::Reject => {
                if observed != prior {
                    return Err(Error::RevisionConflict {
                        role: role.name().to_string(),
                        expected: prior,
                        found: observed,
                    });
                }
            }
        }

        self.backend.save_role(&role.to_value()?)?;
        Ok(race)
    }

    /// Delete a role. Not lock-protected.
    pub fn destroy(&self, role: &Role) -> Result<()> {
        tracing::debug!("Destroying role: {} - {:?}", role.name(), role.revision());
        self.backend.destroy_role(role.name())?;
        tracing::debug!("Done removing role: {} - {:?}", role.name(), role.revision());
        Ok(())
    }

    /// Backend this registry writes to.
    pub fn backend(&self) -> &dyn ConfigBackend {
        self.backend.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::lock::{LockHandle, MemoryLockService};
    use crate::test_utils::TestEnv;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_first_save_is_revision_zero() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");

        let outcome = registry.save(&mut role).unwrap();
        assert_eq!(outcome.revision, 0);
        assert_eq!(outcome.race, None);
        assert_eq!(registry.find_by_name("dns-config-default").unwrap().unwrap().revision(), Some(0));
    }

    #[test]
    fn test_subsequent_saves_increment() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");

        for expected in 0..4 {
            assert_eq!(registry.save(&mut role).unwrap().revision, expected);
        }
        assert_eq!(role.revision(), Some(3));
        assert!(!env.locks.is_held("role:dns-config-default"));
    }

    #[test]
    fn test_exhausted_revision_is_invalid_input() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");
        role.override_attributes_mut()
            .insert("dns".to_string(), json!({"crowbar-revision": u64::MAX}));

        let err = registry.save(&mut role).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(role.revision(), Some(u64::MAX));
        assert!(registry.find_by_name("dns-config-default").unwrap().is_none());
        assert!(!env.locks.is_held("role:dns-config-default"));
    }

    #[test]
    fn test_stale_writer_reports_race_but_writes() {
        let env = TestEnv::new();
        let registry = env.roles();

        let mut first = Role::new("nova-config-default");
        registry.save(&mut first).unwrap();
        let mut stale = registry.find_by_name("nova-config-default").unwrap().unwrap();
        registry.save(&mut first).unwrap();

        // stale started from revision 0 and now writes 1, but 1 is already persisted
        stale.set_description("from the stale writer");
        let outcome = registry.save(&mut stale).unwrap();
        assert_eq!(outcome.revision, 1);
        let race = outcome.race.unwrap();
        assert_eq!(race.observed, 1);
        assert_eq!(race.written, 1);

        let persisted = registry.find_by_name("nova-config-default").unwrap().unwrap();
        assert_eq!(persisted.description(), "from the stale writer");
    }

    #[test]
    fn test_reject_policy_refuses_stale_write() {
        let env = TestEnv::new();
        let registry = env.roles().with_policy(RevisionPolicy::Reject);

        let mut first = Role::new("nova-config-default");
        registry.save(&mut first).unwrap();
        let mut stale = registry.find_by_name("nova-config-default").unwrap().unwrap();
        registry.save(&mut first).unwrap();

        stale.set_description("lost update");
        match registry.save(&mut stale) {
            Err(Error::RevisionConflict { expected, found, .. }) => {
                assert_eq!(expected, Some(0));
                assert_eq!(found, Some(1));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        // in-memory revision restored, persisted record untouched
        assert_eq!(stale.revision(), Some(0));
        let persisted = registry.find_by_name("nova-config-default").unwrap().unwrap();
        assert_eq!(persisted.description(), "");
        assert!(!env.locks.is_held("role:nova-config-default"));

        // re-read and retry succeeds
        let mut fresh = registry.find_by_name("nova-config-default").unwrap().unwrap();
        assert_eq!(registry.save(&mut fresh).unwrap().revision, 2);
    }

    #[test]
    fn test_reject_policy_refuses_blind_create_over_existing() {
        let env = TestEnv::new();
        let registry = env.roles().with_policy(RevisionPolicy::Reject);
        registry.save(&mut Role::new("dns-config-default")).unwrap();

        let result = registry.save(&mut Role::new("dns-config-default"));
        assert!(matches!(result, Err(Error::RevisionConflict { expected: None, found: Some(0), .. })));
    }

    #[test]
    fn test_other_barclamp_revisions_do_not_race() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");
        registry.save(&mut role).unwrap();

        // another barclamp's counter in the persisted record is irrelevant
        let mut persisted = registry.find_by_name("dns-config-default").unwrap().unwrap();
        persisted
            .override_attributes_mut()
            .insert("ntp".to_string(), json!({"crowbar-revision": 40}));
        env.backend.save_role(&persisted.to_value().unwrap()).unwrap();

        let outcome = registry.save(&mut role).unwrap();
        assert_eq!(outcome.race, None);
    }

    #[test]
    fn test_write_failure_releases_lock_and_restores_revision() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");
        registry.save(&mut role).unwrap();

        env.backend.set_offline(true);
        assert!(matches!(registry.save(&mut role), Err(Error::Transport(_))));
        assert_eq!(role.revision(), Some(0));
        assert!(!env.locks.is_held("role:dns-config-default"));
    }

    /// Backend whose writes fail while reads work.
    struct ReadOnly(MemoryBackend);

    impl ConfigBackend for ReadOnly {
        fn load_role(&self, name: &str) -> Result<serde_json::Value> {
            self.0.load_role(name)
        }
        fn search_roles(&self, query: Option<&str>) -> Result<crate::backend::SearchResponse> {
            self.0.search_roles(query)
        }
        fn save_role(&self, _record: &serde_json::Value) -> Result<()> {
            Err(Error::Transport("read-only".to_string()))
        }
        fn destroy_role(&self, name: &str) -> Result<()> {
            self.0.destroy_role(name)
        }
        fn load_data_bag(&self, name: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
            self.0.load_data_bag(name)
        }
        fn location(&self) -> String {
            "read-only".to_string()
        }
        fn backend_type(&self) -> &'static str {
            "read-only"
        }
    }

    #[test]
    fn test_lock_released_when_only_write_fails() {
        let locks = Arc::new(MemoryLockService::new(Duration::from_millis(50)));
        let registry = RoleRegistry::new(Arc::new(ReadOnly(MemoryBackend::new())), locks.clone());
        let mut role = Role::new("dns-config-default");

        assert!(registry.save(&mut role).is_err());
        assert!(!locks.is_held("role:dns-config-default"));
        assert_eq!(role.revision(), None);
    }

    /// Lock service recording the order of acquire/release calls.
    #[derive(Default)]
    struct RecordingLocks {
        events: Mutex<Vec<String>>,
    }

    impl LockService for RecordingLocks {
        fn acquire(&self, name: &str) -> Result<LockHandle> {
            self.events.lock().unwrap().push(format!("acquire {}", name));
            Ok(LockHandle::new(name, None))
        }
        fn release(&self, handle: LockHandle) -> Result<()> {
            self.events.lock().unwrap().push(format!("release {}", handle.name()));
            Ok(())
        }
    }

    #[test]
    fn test_lock_is_keyed_by_role_name() {
        let locks = Arc::new(RecordingLocks::default());
        let registry = RoleRegistry::new(Arc::new(MemoryBackend::new()), locks.clone());
        registry.save(&mut Role::new("dns-config-default")).unwrap();

        let events = locks.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["acquire role:dns-config-default", "release role:dns-config-default"]
        );
    }

    #[test]
    fn test_lock_timeout_propagates() {
        let env = TestEnv::new();
        let locks = Arc::new(MemoryLockService::new(Duration::from_millis(20)));
        let registry = RoleRegistry::new(env.backend.clone(), locks.clone());
        let _held = locks.acquire("role:dns-config-default").unwrap();

        let mut role = Role::new("dns-config-default");
        assert!(matches!(registry.save(&mut role), Err(Error::LockTimeout { .. })));
        assert_eq!(role.revision(), None);
        assert!(env.backend.is_empty());
    }

    #[test]
    fn test_find_by_name_missing_and_transport() {
        let env = TestEnv::new();
        let registry = env.roles();
        assert!(registry.find_by_name("missing").unwrap().is_none());

        env.backend.set_offline(true);
        assert!(matches!(registry.find_by_name("missing"), Err(Error::Transport(_))));
    }

    #[test]
    fn test_search_drops_malformed_rows() {
        let env = TestEnv::new();
        let registry = env.roles();
        registry.save(&mut Role::new("dns-config-default")).unwrap();
        env.backend.insert_raw("broken-1", json!({"description": "no name"})).unwrap();
        env.backend.insert_raw("broken-2", json!("just a string")).unwrap();
        env.backend
            .insert_raw("broken-3", json!({"name": "x", "run_list": 7}))
            .unwrap();

        let roles = registry.all().unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name(), "dns-config-default");
    }

    #[test]
    fn test_search_transport_error_propagates() {
        let env = TestEnv::new();
        env.backend.set_offline(true);
        assert!(env.roles().find_by_search(None).is_err());
    }

    #[test]
    fn test_list_active() {
        let env = TestEnv::new();
        let registry = env.roles();
        for name in [
            "dns-config-default",
            "nova-config-default",
            "nova-config-second",
            "nova-controller",
        ] {
            registry.save(&mut Role::new(name)).unwrap();
        }

        let all: Vec<String> = registry
            .list_active(None, None)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(all, vec!["dns_default", "nova_default", "nova_second"]);

        let nova = registry.list_active(Some("nova"), None).unwrap();
        assert_eq!(nova.len(), 2);

        let one = registry.list_active(Some("nova"), Some("second")).unwrap();
        assert_eq!(
            one,
            vec![ActiveProposal {
                barclamp: "nova".to_string(),
                instance: "second".to_string()
            }]
        );

        assert!(registry.list_active(Some("glance"), None).unwrap().is_empty());
    }

    #[test]
    fn test_destroy() {
        let env = TestEnv::new();
        let registry = env.roles();
        let mut role = Role::new("dns-config-default");
        registry.save(&mut role).unwrap();
        registry.destroy(&role).unwrap();
        assert!(registry.find_by_name("dns-config-default").unwrap().is_none());
        assert!(matches!(registry.destroy(&role), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_revision_policy_parse() {
        assert_eq!(RevisionPolicy::parse("WARN"), Some(RevisionPolicy::Warn));
        assert_eq!(RevisionPolicy::parse("reject"), Some(RevisionPolicy::Reject));
        assert_eq!(RevisionPolicy::parse("abort"), None);
    }
}
