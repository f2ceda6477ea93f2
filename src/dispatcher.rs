//! Language dispatch: the engine's single entry point.
//!
//! The dispatcher maps a case-insensitive language name to its executor and
//! hands the run to the [`TestVerifier`]. Unknown languages produce an
//! "unsupported" result without touching any executor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::types::{ErrorKind, ExecutionResult, Language, TestCase};
use crate::verifier::runtime::{
    EnvironmentCheck, Executor, GoSimulator, JavaScriptRuntime, PythonRuntime,
};
use crate::verifier::TestVerifier;

/// Routes submissions to per-language executors
#[derive(Clone)]
pub struct Dispatcher {
    executors: HashMap<Language, Arc<dyn Executor>>,
    verifier: TestVerifier,
}

impl Dispatcher {
    /// Create a dispatcher with every built-in executor registered
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let mut dispatcher = Self::empty(TestVerifier::new(config.matching));
        dispatcher.register(Arc::new(JavaScriptRuntime::with_config(config.sandbox.clone())));
        dispatcher.register(Arc::new(GoSimulator::with_config(config.sandbox.clone())));
        dispatcher.register(Arc::new(PythonRuntime::with_config(
            config.sandbox.clone(),
            config.python.clone(),
        )));
        dispatcher
    }

    /// Create a dispatcher with no executors
    #[must_use]
    pub fn empty(verifier: TestVerifier) -> Self {
        Self {
            executors: HashMap::new(),
            verifier,
        }
    }

    /// Register an executor, returning the one it replaced
    pub fn register(&mut self, executor: Arc<dyn Executor>) -> Option<Arc<dyn Executor>> {
        let language = executor.language();
        info!("registered {} executor", language);
        self.executors.insert(language, executor)
    }

    /// Find the executor for a language name or alias
    #[must_use]
    pub fn resolve(&self, language: &str) -> Option<&Arc<dyn Executor>> {
        Language::parse(language).and_then(|lang| self.executors.get(&lang))
    }

    /// Registered languages, in a stable order
    #[must_use]
    pub fn languages(&self) -> Vec<Language> {
        Language::all()
            .into_iter()
            .filter(|lang| self.executors.contains_key(lang))
            .collect()
    }

    /// Describe every registered runtime
    #[must_use]
    pub fn capabilities(&self) -> Vec<EnvironmentCheck> {
        self.languages()
            .iter()
            .filter_map(|lang| self.executors.get(lang))
            .map(|executor| executor.environment())
            .collect()
    }

    /// The verifier used for graded runs
    #[must_use]
    pub const fn verifier(&self) -> &TestVerifier {
        &self.verifier
    }

    /// Run a submission on the calling thread
    #[must_use]
    pub fn execute(
        &self,
        code: &str,
        language: &str,
        test_cases: Option<&[TestCase]>,
    ) -> ExecutionResult {
        let Some(executor) = self.resolve(language) else {
            warn!("unsupported language requested: {}", language);
            return ExecutionResult::unsupported(language);
        };
        debug!(
            "dispatching {} submission ({} bytes, {} test cases)",
            executor.language(),
            code.len(),
            test_cases.map_or(0, <[TestCase]>::len)
        );
        self.verifier.execute(executor.as_ref(), code, test_cases)
    }

    /// Run a submission on the blocking pool
    ///
    /// Execution is CPU bound, so it is kept off the async worker threads.
    pub async fn execute_code(
        &self,
        code: String,
        language: String,
        test_cases: Option<Vec<TestCase>>,
    ) -> ExecutionResult {
        let Some(executor) = self.resolve(&language).cloned() else {
            warn!("unsupported language requested: {}", language);
            return ExecutionResult::unsupported(&language);
        };
        let verifier = self.verifier;

        let task = tokio::task::spawn_blocking(move || {
            verifier.execute(executor.as_ref(), &code, test_cases.as_deref())
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("execution task failed: {}", e);
                ExecutionResult::failure(
                    ErrorKind::Runtime,
                    format!("execution task failed: {e}"),
                    String::new(),
                    0,
                )
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("languages", &self.languages())
            .field("verifier", &self.verifier)
            .finish()
    }
}
