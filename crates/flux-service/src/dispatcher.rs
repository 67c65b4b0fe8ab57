//! Module/action request dispatch.
//!
//! Every panel request resolves to a `(module, action)` pair, either from
//! clean URL path segments (`/account/view`) or from the `module` and
//! `action` query parameters. Rendering the resolved route is left to the
//! view layer; this module only makes the routing decision.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::auth::Session;

/// Notice shown to guests bounced to the login page.
pub const LOGIN_NOTICE: &str = "Please login to continue.";

/// Module and action guests are sent to when a route needs a login.
const LOGIN_ROUTE: (&str, &str) = ("account", "login");

/// Module logged-in users are sent to when their level is too low.
const UNAUTHORIZED_MODULE: &str = "unauthorized";

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Module used when the request names none.
    pub default_module: String,
    /// Action used when the request names none.
    pub default_action: String,
    /// Route from path segments instead of query parameters.
    pub use_clean_urls: bool,
    /// Base URI the panel is mounted at.
    pub base_uri: String,
}

/// The parts of an HTTP request the dispatcher looks at.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    /// Request URI as received: path plus optional query string.
    pub uri: &'a str,
    /// Decoded request parameters.
    pub params: &'a HashMap<String, String>,
}

/// A resolved route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Module to run.
    pub module: String,
    /// Action within the module.
    pub action: String,
    /// Request parameters, with `module` and `action` set to the resolved pair.
    pub params: BTreeMap<String, String>,
    /// Flash message for the next page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Where to send the user after logging in, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

/// Dispatcher configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No default module configured.
    #[error("please set the default module")]
    MissingDefaultModule,
    /// No default action configured.
    #[error("please set the default action")]
    MissingDefaultAction,
}

/// Decides whether a session may run an action.
pub trait Authorizer: Send + Sync {
    /// Whether `session` may run `action` of `module`.
    fn action_allowed(&self, module: &str, action: &str, session: &Session) -> bool;
}

/// Minimum account level per route.
///
/// Keys are either `module` or `module/action`; the more specific key wins.
/// Routes with no entry are open to everyone.
#[derive(Debug, Clone, Default)]
pub struct AccessTable {
    levels: HashMap<String, i32>,
}

impl AccessTable {
    /// Build a table from `module` / `module/action` keys.
    #[must_use]
    pub fn new(levels: HashMap<String, i32>) -> Self {
        Self { levels }
    }

    /// Minimum level for a route, if one is configured.
    #[must_use]
    pub fn required_level(&self, module: &str, action: &str) -> Option<i32> {
        self.levels
            .get(&format!("{module}/{action}"))
            .or_else(|| self.levels.get(module))
            .copied()
    }
}

impl Authorizer for AccessTable {
    fn action_allowed(&self, module: &str, action: &str, session: &Session) -> bool {
        self.required_level(module, action)
            .map_or(true, |required| session.level() >= required)
    }
}

/// Resolve the route for a request.
///
/// # Errors
///
/// Returns an error if no default module or action is configured.
pub fn resolve_route(
    request: &DispatchRequest<'_>,
    config: &DispatchConfig,
    authorizer: &dyn Authorizer,
    session: &Session,
) -> Result<Route, DispatchError> {
    let default_module = config.default_module.trim();
    let default_action = config.default_action.trim();
    if default_module.is_empty() {
        return Err(DispatchError::MissingDefaultModule);
    }
    if default_action.is_empty() {
        return Err(DispatchError::MissingDefaultAction);
    }

    let (requested_module, requested_action) = if config.use_clean_urls {
        let mut segments = path_segments(request.uri, &config.base_uri).into_iter();
        (segments.next(), segments.next())
    } else {
        (param(request.params, "module"), param(request.params, "action"))
    };

    let module = requested_module
        .map(|name| strip_path_tokens(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| default_module.to_string());
    let action = requested_action
        .map(|name| strip_path_tokens(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| default_action.to_string());

    let mut route = Route {
        module,
        action,
        params: request
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        notice: None,
        return_to: None,
    };

    if !authorizer.action_allowed(&route.module, &route.action, session) {
        if session.is_logged_in() {
            tracing::debug!(
                module = %route.module,
                action = %route.action,
                "Access level too low"
            );
            route.module = UNAUTHORIZED_MODULE.to_string();
            route.action = default_action.to_string();
        } else {
            tracing::debug!(
                module = %route.module,
                action = %route.action,
                "Login required"
            );
            route.module = LOGIN_ROUTE.0.to_string();
            route.action = LOGIN_ROUTE.1.to_string();
            route.notice = Some(LOGIN_NOTICE.to_string());
            route.return_to = Some(request.uri.to_string());
        }
    }

    route.params.insert("module".into(), route.module.clone());
    route.params.insert("action".into(), route.action.clone());
    Ok(route)
}

/// Remove `..`, `/` and `\` from a user-supplied module or action name.
///
/// Separators go first so that `./.` cannot collapse into `..`.
#[must_use]
pub fn strip_path_tokens(name: &str) -> String {
    let mut clean: String = name.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    while clean.contains("..") {
        clean = clean.replace("..", "");
    }
    clean
}

fn param(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Path segments of `uri` below `base_uri`, query string dropped.
fn path_segments(uri: &str, base_uri: &str) -> Vec<String> {
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    let path = collapse_slashes(path);
    let base = collapse_slashes(base_uri.trim_end_matches('/'));

    let below_base = path
        .strip_prefix(base.as_str())
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(&path);

    below_base
        .split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
