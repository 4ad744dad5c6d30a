use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::error::Result;
use crate::reporter::Reporter;

/// Identity of one remote host in the deployment. Results of fanned-out
/// work are attributed to servers through this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Server(String);

impl Server {
    pub fn new(name: impl Into<String>) -> Self {
        Server(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Server {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Server {
    fn from(name: &str) -> Self {
        Server(name.to_string())
    }
}

/// Outcome of one remote command. Command-level failure is carried in
/// `ok`; transport failures surface as errors from the client instead.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        CommandResult {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        CommandResult {
            ok: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Remote execution collaborator. Transport (SSH or otherwise) is out of
/// scope for the core; plugin bodies only see this surface, decorated so
/// the invocation's reporter rides along with every call.
pub trait RemoteClient: Send + Sync {
    fn execute_command(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
        reporter: &Reporter,
    ) -> Result<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_ordering_and_display() {
        let a = Server::new("192.168.1.10");
        let b = Server::new("192.168.1.11");
        assert!(a < b);
        assert_eq!(a.to_string(), "192.168.1.10");
        assert_eq!(Server::from("x"), Server::new("x"));
    }

    #[test]
    fn test_command_result_constructors() {
        let ok = CommandResult::success("out");
        assert!(ok.ok);
        assert_eq!(ok.stdout, "out");

        let err = CommandResult::failure("boom");
        assert!(!err.ok);
        assert_eq!(err.stderr, "boom");
    }
}
