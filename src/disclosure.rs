//! How much of an exception reaches the client.
//!
//! Development renders everything we know, production renders public
//! messages only and collapses the rest into a generic 500.

use axum::extract::ConnectInfo;
use axum::extract::Request;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::errors::exception::{reason_phrase, Exception};
use crate::response::{Envelope, Extra};

lazy_static! {
    /// `at ./src/api.rs:12:5` (Rust backtraces) or `at f (/app/x.js:1:2)`
    static ref FRAME_LOCATION: Regex =
        Regex::new(r"at[ \t]+(?:[^\s(]+[ \t]+)?\(?(?P<file>[^\s()]+?):(?P<line>\d+):(?P<column>\d+)\)?")
            .expect("valid frame location regex");
}

/// Files whose frames never identify where an error came from
const SKIPPED_FRAME_MARKERS: [&str; 3] = ["/rustc/", "/.cargo/registry/", "errors/exception.rs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisclosureMode {
    Development,
    Production,
}

impl DisclosureMode {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for DisclosureMode {
    type Err = String;

    /// Accepts the deployment environment name; `test` renders like production
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" | "test" => Ok(Self::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for DisclosureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Request details shown in development diagnostics. Never used for classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
}

impl RequestMeta {
    pub fn from_request(request: &Request) -> Self {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            method: request.method().to_string(),
            path: request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string()),
            ip: forwarded.or(peer),
        }
    }
}

/// Source location of the frame an exception was raised from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLocation {
    pub file_name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// First frame outside the standard library, dependencies and the exception constructor
pub fn locate(stack: &str) -> Option<StackLocation> {
    FRAME_LOCATION.captures_iter(stack).find_map(|caps| {
        let file = caps.name("file")?.as_str();
        if SKIPPED_FRAME_MARKERS.iter().any(|marker| file.contains(marker)) {
            return None;
        }
        Some(StackLocation {
            file_name: file.rsplit(['/', '\\']).next().unwrap_or(file).to_string(),
            file: file.to_string(),
            line: caps.name("line")?.as_str().parse().ok()?,
            column: caps.name("column")?.as_str().parse().ok()?,
        })
    })
}

/// Side channel mirroring development errors somewhere a developer will see them
pub trait ErrorNotifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that emits a dedicated tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ErrorNotifier for TracingNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(target: "error_notify", title = %title, "{}", body);
    }
}

#[derive(Clone)]
pub struct Renderer {
    mode: DisclosureMode,
    notifier: Option<Arc<dyn ErrorNotifier>>,
    show_console: bool,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("mode", &self.mode)
            .field("notifier", &self.notifier.is_some())
            .field("show_console", &self.show_console)
            .finish()
    }
}

impl Renderer {
    pub fn new(mode: DisclosureMode) -> Self {
        Self {
            mode,
            notifier: None,
            show_console: false,
        }
    }

    /// Mirror development errors through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn ErrorNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Dump every development error to the log at error level
    pub fn with_console(mut self, show_console: bool) -> Self {
        self.show_console = show_console;
        self
    }

    pub fn mode(&self) -> DisclosureMode {
        self.mode
    }

    /// Whether rendering `exception` discards its real content
    pub fn redacts(&self, exception: &Exception) -> bool {
        self.mode == DisclosureMode::Production && !exception.is_public
    }

    pub fn render(&self, exception: Exception, meta: &RequestMeta) -> Envelope {
        match self.mode {
            DisclosureMode::Development => self.render_development(exception, meta),
            DisclosureMode::Production => render_production(exception),
        }
    }

    fn render_development(&self, exception: Exception, meta: &RequestMeta) -> Envelope {
        if self.show_console {
            error!(
                method = %meta.method,
                path = %meta.path,
                kind = %exception.kind,
                status = exception.status_code,
                stack = exception.stack.as_deref().unwrap_or(""),
                "Error development => {}",
                exception
            );
        }
        if let Some(notifier) = &self.notifier {
            let title = format!("Error in {} - {}", meta.method, meta.path);
            let body = format!(
                "Name: {}\nMessage: {}\nStatus code: {}\nType: {}",
                exception.kind, exception.message, exception.status_code, exception.exception_type
            );
            notifier.notify(&title, &body);
        }

        let location = exception.stack.as_deref().and_then(locate);
        let message = serde_json::to_value(&exception.message)
            .unwrap_or_else(|_| Value::String(exception.message.to_string()));

        let diagnostic = json!({
            "method": meta.method,
            "path": meta.path,
            "ip": meta.ip,
            "message": message,
            "statusCode": exception.status_code,
            "isPublic": exception.is_public,
            "kind": exception.kind,
            "type": exception.exception_type.to_string(),
            "code": exception.code,
            "timestamp": exception.timestamp.to_rfc3339(),
            "fileName": location.as_ref().map(|l| l.file_name.clone()),
            "file": location.as_ref().map(|l| l.file.clone()),
            "line": location.as_ref().map(|l| l.line),
            "column": location.as_ref().map(|l| l.column),
            "stackPath": location.as_ref().map(|l| format!("{}:{}:{}", l.file, l.line, l.column)),
            "stack": exception.stack,
        });

        Envelope::fail(exception.status_code, Some(diagnostic), Extra::new())
    }
}

fn render_production(exception: Exception) -> Envelope {
    if !exception.is_public {
        return Envelope::internal_server_error();
    }

    let message = match exception.code {
        Some(code) => Value::String(code),
        None => serde_json::to_value(&exception.message)
            .unwrap_or_else(|_| Value::String(reason_phrase(exception.status_code).to_string())),
    };
    Envelope::fail(exception.status_code, Some(message), Extra::new())
}
