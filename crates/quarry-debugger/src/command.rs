use std::collections::BTreeMap;
use std::path::PathBuf;

use quarry_abi::SpawnFlags;

/// A process builder, providing fine-grained control over how a new
/// debuggee should be spawned.
#[derive(Debug)]
pub struct Command {
    /// Program to spawn.
    pub program: PathBuf,

    /// Program arguments for the process to spawn.
    pub args: Vec<String>,

    /// Environment variables for the process to spawn.
    pub env: CommandEnv,

    /// Working directory for the process to spawn.
    pub current_dir: Option<PathBuf>,

    /// Spawn configuration flags.
    pub flags: SpawnFlags,
}

impl Command {
    /// Constructs a new `Command` for launching the program at path
    /// `program`, with the following default configuration:
    ///
    /// * No arguments to the program
    /// * Inherit the current process's environment
    /// * Inherit the current process's working directory
    /// * No spawn flags
    ///
    /// If `program` is not an absolute path, the `PATH` will be searched
    /// in an OS-defined way.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: CommandEnv::Inherit(BTreeMap::new()),
            current_dir: None,
            flags: SpawnFlags::empty(),
        }
    }

    /// Adds an argument to pass to the program.
    ///
    /// To pass multiple arguments see [`args`](Self::args).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the program.
    ///
    /// To pass a single argument see [`arg`](Self::arg).
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    /// Inserts or updates an explicit environment variable mapping.
    ///
    /// The debuggee inherits environment variables from this process by
    /// default; explicitly set variables take precedence over inherited
    /// ones. Use [`env_clear`](Self::env_clear) to disable inheritance
    /// entirely, or [`env_remove`](Self::env_remove) for a single key.
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        match self.env {
            CommandEnv::Inherit(ref mut env) => {
                env.insert(key.into(), Some(val.into()));
            }
            CommandEnv::NoInherit(ref mut env) => {
                env.insert(key.into(), val.into());
            }
        }

        self
    }

    /// Inserts or updates multiple explicit environment variable mappings.
    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        vars.into_iter().fold(self, |cmd, (k, v)| cmd.env(k, v))
    }

    /// Removes an explicitly set environment variable and prevents
    /// inheriting it from this process.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        match self.env {
            CommandEnv::Inherit(ref mut env) => {
                env.insert(key.into(), None);
            }
            CommandEnv::NoInherit(ref mut env) => {
                env.remove(&key.into());
            }
        }

        self
    }

    /// Clears all explicitly set environment variables and prevents
    /// inheriting any environment variable from this process.
    pub fn env_clear(mut self) -> Self {
        self.env = CommandEnv::NoInherit(BTreeMap::new());
        self
    }

    /// Sets the working directory for the process to spawn.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Replaces the spawn configuration flags.
    pub fn flags(mut self, flags: SpawnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Disables address-space-layout randomization for the debuggee.
    pub fn disable_aslr(mut self) -> Self {
        self.flags |= SpawnFlags::DISABLE_ASLR;
        self
    }
}

/// Environment variables attached to a [Command].
#[derive(Debug)]
pub enum CommandEnv {
    /// Environment variables the process to spawn will have, in addition
    /// to the ones inherited from this process.
    ///
    /// A `None` value indicates that the environment variable will be
    /// removed from the process to spawn, even if it was inherited.
    Inherit(BTreeMap<String, Option<String>>),

    /// Environment variables the process to spawn will have, without
    /// inheriting any from this process.
    NoInherit(BTreeMap<String, String>),
}

impl CommandEnv {
    /// Captures the current environment with the specified changes
    /// applied; `None` means "inherit unchanged".
    pub fn captured(&self) -> Option<BTreeMap<String, String>> {
        let mut captured_env = BTreeMap::new();

        match self {
            Self::Inherit(env) if env.is_empty() => return None,
            Self::Inherit(env) => {
                captured_env.extend(std::env::vars());
                for (k, v) in env {
                    if let Some(v) = v {
                        captured_env.insert(k.clone(), v.clone());
                    } else {
                        captured_env.remove(k);
                    }
                }
            }
            Self::NoInherit(env) => {
                captured_env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        Some(captured_env)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn args_accumulate_in_order() {
        let cmd = Command::new("/bin/true").arg("-a").args(["-b", "-c"]);
        assert_eq!(cmd.args, ["-a", "-b", "-c"]);
    }

    #[test]
    fn inherited_env_applies_overrides() {
        // SAFETY: test-local mutation, no concurrent env readers here
        unsafe { std::env::set_var("QUARRY_TEST_INHERITED", "orig") };

        let cmd = Command::new("/bin/true")
            .env("QUARRY_TEST_INHERITED", "patched")
            .env("QUARRY_TEST_EXTRA", "1");

        let captured = cmd.env.captured().unwrap();
        assert_eq!(
            captured.get("QUARRY_TEST_INHERITED").map(String::as_str),
            Some("patched")
        );
        assert_eq!(
            captured.get("QUARRY_TEST_EXTRA").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn cleared_env_does_not_inherit() {
        let cmd = Command::new("/bin/true").env_clear().env("ONLY", "1");

        let captured = cmd.env.captured().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured.get("ONLY").map(String::as_str), Some("1"));
    }

    #[test]
    fn untouched_env_is_inherited_as_is() {
        assert!(Command::new("/bin/true").env.captured().is_none());
    }

    #[test]
    fn flag_builders() {
        let cmd = Command::new("/bin/true").disable_aslr();
        assert!(cmd.flags.contains(SpawnFlags::DISABLE_ASLR));
    }
}
