use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CaseRecord, HttpResponse};
use crate::error::{CaseError, RegistryError};

/// Judges a response. May append diagnostics to the case's `verifyMessage`.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, case: &mut CaseRecord, response: &HttpResponse)
        -> Result<bool, CaseError>;
}

/// Pre/post request hook. Free to rewrite the case it is handed.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, case: &mut CaseRecord) -> Result<(), CaseError>;
}

#[async_trait]
impl<F> Verifier for F
where
    F: Fn(&mut CaseRecord, &HttpResponse) -> Result<bool, CaseError> + Send + Sync,
{
    async fn verify(
        &self,
        case: &mut CaseRecord,
        response: &HttpResponse,
    ) -> Result<bool, CaseError> {
        self(case, response)
    }
}

#[async_trait]
impl<F> Hook for F
where
    F: Fn(&mut CaseRecord) -> Result<(), CaseError> + Send + Sync,
{
    async fn call(&self, case: &mut CaseRecord) -> Result<(), CaseError> {
        self(case)
    }
}

/// Name → implementation lookup for verifiers and hooks. Filled before the
/// run starts and read-only afterwards.
#[derive(Clone, Default)]
pub struct Registry {
    verifiers: HashMap<String, Arc<dyn Verifier>>,
    hooks: HashMap<String, Arc<dyn Hook>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_verifier(
        &mut self,
        name: &str,
        verifier: impl Verifier + 'static,
    ) -> Result<(), RegistryError> {
        insert_unique(&mut self.verifiers, "Verifier", name, Arc::new(verifier))
    }

    pub fn register_hook(
        &mut self,
        name: &str,
        hook: impl Hook + 'static,
    ) -> Result<(), RegistryError> {
        insert_unique(&mut self.hooks, "Hook", name, Arc::new(hook))
    }

    pub fn verifier(&self, name: &str) -> Result<Arc<dyn Verifier>, CaseError> {
        self.verifiers.get(name).cloned().ok_or_else(|| {
            CaseError::Configuration(format!("Verification function `{name}` is not registered."))
        })
    }

    pub fn hook(&self, name: &str) -> Result<Arc<dyn Hook>, CaseError> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| CaseError::Configuration(format!("Hook `{name}` is not registered.")))
    }

    pub fn verifier_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn insert_unique<T: ?Sized>(
    entries: &mut HashMap<String, Arc<T>>,
    kind: &'static str,
    name: &str,
    entry: Arc<T>,
) -> Result<(), RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyName { kind });
    }
    if entries.contains_key(name) {
        return Err(RegistryError::Duplicate {
            kind,
            name: name.to_string(),
        });
    }
    entries.insert(name.to_string(), entry);
    Ok(())
}
