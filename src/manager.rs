//! Top-level entry point: an owned manager value bundling the request
//! context and the environments it operates on.
//!
//! `CloudBase::new` is an explicit factory: callers hold and pass the
//! manager; there is no process-wide instance.

use crate::common::CommonService;
use crate::config::{CloudBaseContext, ManagerConfig};
use crate::database::DatabaseService;
use crate::env::EnvService;
use crate::environment::Environment;
use crate::error::{CloudBaseError, CloudBaseResult};
use crate::function::FunctionService;
use crate::hosting::HostingService;
use crate::storage::StorageService;
use std::collections::HashMap;

/// Registry of environments the manager works against; one of them is
/// current at a time.
pub struct EnvironmentManager {
    context: CloudBaseContext,
    envs: HashMap<String, Environment>,
    current: Option<String>,
}

impl EnvironmentManager {
    pub fn new(context: CloudBaseContext) -> Self {
        Self {
            context,
            envs: HashMap::new(),
            current: None,
        }
    }

    /// Register an environment; the first one becomes current.
    pub fn add(&mut self, env_id: &str) {
        if !self.envs.contains_key(env_id) {
            self.envs
                .insert(env_id.to_string(), Environment::new(self.context.clone(), env_id));
        }
        if self.current.is_none() {
            self.current = Some(env_id.to_string());
        }
    }

    pub fn remove(&mut self, env_id: &str) {
        self.envs.remove(env_id);
        if self.current.as_deref() == Some(env_id) {
            self.current = None;
        }
    }

    pub fn get(&self, env_id: &str) -> Option<&Environment> {
        self.envs.get(env_id)
    }

    /// Make a registered environment current. Returns false when it was
    /// never added.
    pub fn switch_env(&mut self, env_id: &str) -> bool {
        if self.envs.contains_key(env_id) {
            self.current = Some(env_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn get_current_env(&self) -> CloudBaseResult<&Environment> {
        self.current
            .as_deref()
            .and_then(|id| self.envs.get(id))
            .ok_or_else(|| {
                CloudBaseError::new(
                    crate::error::ErrorKind::Configuration,
                    "CurrentEnvironmentIsNull",
                    "no current environment, add one first",
                )
            })
    }
}

/// Owned control-plane client.
pub struct CloudBase {
    config: ManagerConfig,
    environment_manager: EnvironmentManager,
}

impl std::fmt::Debug for CloudBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudBase").finish_non_exhaustive()
    }
}

impl CloudBase {
    /// Build a manager from caller configuration.
    ///
    /// `secret_id`/`secret_key` must come as a pair; when neither is set,
    /// credentials fall back to the process environment per request.
    pub fn new(config: ManagerConfig) -> CloudBaseResult<Self> {
        if config.secret_id.is_some() != config.secret_key.is_some() {
            return Err(CloudBaseError::configuration(
                "secretId and secretKey must be a pair",
            ));
        }

        let context = CloudBaseContext::new(&config);
        let mut environment_manager = EnvironmentManager::new(context);
        let env_id = config.env_id.clone().unwrap_or_default();
        environment_manager.add(&env_id);

        Ok(Self {
            config,
            environment_manager,
        })
    }

    /// Register another environment.
    pub fn add_environment(&mut self, env_id: &str) {
        self.environment_manager.add(env_id);
    }

    /// The currently selected environment.
    pub fn current_environment(&self) -> CloudBaseResult<&Environment> {
        self.environment_manager.get_current_env()
    }

    pub fn functions(&self) -> CloudBaseResult<&FunctionService> {
        Ok(self.current_environment()?.get_function_service())
    }

    pub fn storage(&self) -> CloudBaseResult<&StorageService> {
        Ok(self.current_environment()?.get_storage_service())
    }

    pub fn database(&self) -> CloudBaseResult<&DatabaseService> {
        Ok(self.current_environment()?.get_database_service())
    }

    pub fn hosting(&self) -> CloudBaseResult<&HostingService> {
        Ok(self.current_environment()?.get_hosting_service())
    }

    pub fn env(&self) -> CloudBaseResult<&EnvService> {
        Ok(self.current_environment()?.get_env_service())
    }

    pub fn common_service(
        &self,
        service_type: &str,
        version: Option<&str>,
    ) -> CloudBaseResult<CommonService> {
        self.current_environment()?
            .get_common_service(service_type, version)
    }

    pub fn get_environment_manager(&mut self) -> &mut EnvironmentManager {
        &mut self.environment_manager
    }

    pub fn get_manager_config(&self) -> &ManagerConfig {
        &self.config
    }
}
