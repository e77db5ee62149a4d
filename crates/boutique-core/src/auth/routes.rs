use serde::{Deserialize, Serialize};

const DEFAULT_ADMIN_PREFIX: &str = "/admin";
const DEFAULT_LOGIN_PATH: &str = "/admin/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum GuardAction {
    Allow,
    RedirectToLogin,
}

/// The admin-area route set the gate protects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRoutes {
    pub prefix: String,
    pub login_path: String,
}

impl Default for AdminRoutes {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }
}

/// Strip query string, fragment and trailing slashes.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

impl AdminRoutes {
    pub fn new(prefix: impl Into<String>, login_path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            login_path: login_path.into(),
        }
    }

    /// Whether `path` lies inside the admin area (prefix itself included).
    pub fn is_admin_path(&self, path: &str) -> bool {
        let path = normalize(path);
        let prefix = normalize(&self.prefix);
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn is_login_path(&self, path: &str) -> bool {
        normalize(path) == normalize(&self.login_path)
    }

    /// Whether `path` needs an authenticated admin session.
    pub fn requires_session(&self, path: &str) -> bool {
        self.is_admin_path(path) && !self.is_login_path(path)
    }
}
