use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    model::{Application, NewApplication},
    port::ApplicationRegistry,
};

/// Registry kept in process memory, in insertion order. Used when no database is configured.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistry {
    applications: Arc<Mutex<Vec<Application>>>,
}

impl MemoryRegistry {
    fn locked(&self) -> Result<MutexGuard<Vec<Application>>, Error> {
        self.applications
            .lock()
            .map_err(|_| anyhow!("Application registry lock poisoned"))
    }
}

#[async_trait]
impl ApplicationRegistry for MemoryRegistry {
    async fn create(&self, application: NewApplication) -> Result<Application, Error> {
        let application = application.into_application();
        self.locked()?.push(application.clone());
        Ok(application)
    }

    async fn get(&self, id: &str) -> Result<Option<Application>, Error> {
        Ok(self
            .locked()?
            .iter()
            .find(|application| application.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Application>, Error> {
        Ok(self.locked()?.clone())
    }

    async fn update(&self, application: &Application) -> Result<Application, Error> {
        let mut applications = self.locked()?;
        let stored = applications
            .iter_mut()
            .find(|stored| stored.id == application.id)
            .ok_or_else(|| anyhow!("Application {} does not exist", application.id))?;
        *stored = Application {
            id: stored.id.clone(),
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..application.clone()
        };
        Ok(stored.clone())
    }
}
