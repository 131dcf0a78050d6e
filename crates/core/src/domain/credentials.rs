use serde::{Deserialize, Serialize};
use std::fmt;

/// Username/password pair used to open management sessions to a node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A node-specific override wins over the process-wide default.
    pub fn resolve<'a>(node: Option<&'a Credentials>, default: &'a Credentials) -> &'a Credentials {
        node.unwrap_or(default)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "admin")
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_node_override() {
        let default = Credentials::default();
        let node = Credentials::new("netops", "secret");

        assert_eq!(Credentials::resolve(Some(&node), &default).username, "netops");
        assert_eq!(Credentials::resolve(None, &default).username, "admin");
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
