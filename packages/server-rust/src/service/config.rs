/// Default server identity announced in `Welcome`: `<crate>/<version>`.
pub const DEFAULT_SERVER_IDENTITY: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default stem for error URIs in router-generated `CallError` replies.
pub const DEFAULT_ERROR_URI_BASE: &str = "http://wamp.ws/error#";

/// Router-level configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Identity string sent as the last field of every `Welcome`.
    pub server_identity: String,
    /// Reply with a `CallError` when a call has no handler or its arguments
    /// do not fit the registered shape. The application is notified either way.
    pub reply_call_errors: bool,
    /// Stem of the error URIs used in those replies.
    pub error_uri_base: String,
}

impl RouterConfig {
    /// Error URI for calls to an unregistered procedure.
    #[must_use]
    pub fn no_such_procedure_uri(&self) -> String {
        format!("{}noSuchProcedure", self.error_uri_base)
    }

    /// Error URI for calls whose arguments do not fit the registered shape.
    #[must_use]
    pub fn invalid_argument_uri(&self) -> String {
        format!("{}invalidArgument", self.error_uri_base)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            server_identity: DEFAULT_SERVER_IDENTITY.to_string(),
            reply_call_errors: true,
            error_uri_base: DEFAULT_ERROR_URI_BASE.to_string(),
        }
    }
}
