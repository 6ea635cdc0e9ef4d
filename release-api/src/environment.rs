use std::collections::HashMap;

/// Read access to environment variables.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, used where the process environment must not leak in.
#[derive(Clone, Debug, Default)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn new<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        StaticEnvironment {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeMode {
    Local,
    Hosted,
}

impl RuntimeMode {
    pub fn is_local(self) -> bool {
        self == RuntimeMode::Local
    }
}

/// Decides between local development and a hosted deployment by looking at a
/// single indicator variable that only the hosting platform sets.
#[derive(Clone, Debug)]
pub struct EnvironmentDetector {
    indicator: String,
}

impl EnvironmentDetector {
    pub fn new(indicator: impl Into<String>) -> Self {
        EnvironmentDetector {
            indicator: indicator.into(),
        }
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn detect(&self, env: &dyn Environment) -> RuntimeMode {
        match env.var(&self.indicator) {
            Some(value) if !value.trim().is_empty() => RuntimeMode::Hosted,
            _ => RuntimeMode::Local,
        }
    }
}
