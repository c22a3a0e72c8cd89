/// Source of environment values. Production reads the process env; tests pass a map.
pub(super) trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

pub(super) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

#[cfg(test)]
impl EnvSource for std::collections::HashMap<&str, &str> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).map(ToString::to_string)
    }
}

#[must_use]
pub(super) fn read_non_empty_env(env: &impl EnvSource, name: &str) -> Option<String> {
    env.var(name)
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Unparseable or too-small values read as absent.
#[must_use]
pub(super) fn read_env_usize(env: &impl EnvSource, name: &str, min_value: usize) -> Option<usize> {
    env.var(name)
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value >= min_value)
}
