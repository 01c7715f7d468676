//! Label grammar for site bindings
//!
//! A container opts into routing by carrying a label (default key
//! `virtual.bind`) whose value is a small line-oriented document:
//!
//! ```text
//! # comment
//! 80 example.com www.example.com
//! header Server "edge"
//! host:tls {
//!   internal
//! }
//! 8080 /api api.example.com
//! ```
//!
//! Each line starting with a port opens a new [`SiteConfig`]. Other lines are
//! directives for the most recently opened binding. A directive ending in `{`
//! swallows following lines until its matching `}`. Directives prefixed with
//! `host:` go to the site block, everything else into `reverse_proxy`.

use crate::docker::ContainerInfo;
use thiserror::Error;
use tracing::warn;

/// Prefix marking a directive for the host-level section
const HOST_PREFIX: &str = "host:";

/// One site binding parsed from a container label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteConfig {
    /// Hostnames as written in the header, never empty
    pub hostnames: Vec<String>,
    /// Upstream port on the container
    pub port: u16,
    /// Path matcher such as `/api`, empty when absent
    pub path_matcher: String,
    /// Container name without the leading `/`
    pub name: String,
    /// Directives rendered inside the `handle` block
    pub host_directives: Vec<String>,
    /// Directives rendered inside the `reverse_proxy` block
    pub proxy_directives: Vec<String>,
    /// Container address on the proxy network, empty if not attached
    pub proxy_ip: String,
}

impl SiteConfig {
    /// Key used to group bindings that share a hostname set
    pub fn group_key(&self) -> String {
        self.hostnames.join(" ")
    }
}

/// Errors that discard a whole label
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// A `{` block was still open when the label ended
    #[error("unterminated directive starting at line {line}: {directive}")]
    UnterminatedDirective { line: usize, directive: String },
}

/// Result of inspecting a header line
enum Header {
    /// Not a header, treat as directive
    NotHeader,
    /// Looked like a header but was rejected
    Invalid(&'static str),
    Valid {
        port: u16,
        path_matcher: String,
        hostnames: Vec<String>,
    },
}

fn parse_header(line: &str) -> Header {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next().filter(|token| is_integer(token)) else {
        return Header::NotHeader;
    };

    let port = match first.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => return Header::Invalid("port out of range"),
    };

    let rest: Vec<&str> = tokens.collect();
    let (path_matcher, hostnames) = match rest.split_first() {
        Some((first, hosts)) if first.starts_with('/') => (first.to_string(), hosts),
        _ => (String::new(), rest.as_slice()),
    };

    if hostnames.is_empty() {
        return Header::Invalid("no hostnames");
    }

    Header::Valid {
        port,
        path_matcher,
        hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
    }
}

/// Optional sign followed by ASCII digits
fn is_integer(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Route a finished directive to the host or proxy section
fn attach_directive(site: &mut SiteConfig, directive: String) {
    match directive.strip_prefix(HOST_PREFIX) {
        Some(body) => site.host_directives.push(body.trim().to_string()),
        None => site.proxy_directives.push(directive),
    }
}

/// Parse one label value into site bindings
///
/// Malformed lines are logged and skipped. Only an unterminated `{` block
/// fails the label as a whole, in which case the caller should drop every
/// binding from it.
pub fn parse_label(raw: &str, name: &str, proxy_ip: &str) -> Result<Vec<SiteConfig>, LabelError> {
    let mut sites = Vec::new();
    let mut current: Option<SiteConfig> = None;
    let mut lines = raw.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_header(trimmed) {
            Header::Valid {
                port,
                path_matcher,
                hostnames,
            } => {
                sites.extend(current.take());
                current = Some(SiteConfig {
                    hostnames,
                    port,
                    path_matcher,
                    name: name.to_string(),
                    proxy_ip: proxy_ip.to_string(),
                    ..Default::default()
                });
                continue;
            }
            Header::Invalid(reason) => {
                warn!(container = name, line = trimmed, reason, "Ignored invalid binding");
                continue;
            }
            Header::NotHeader => {}
        }

        if trimmed.strip_prefix(HOST_PREFIX).map_or(trimmed, str::trim) == "}" {
            warn!(container = name, line = index + 1, "Ignored unmatched closing brace");
            continue;
        }

        let Some(site) = current.as_mut() else {
            warn!(container = name, line = trimmed, "Ignored directive without binding");
            continue;
        };

        if !trimmed.ends_with('{') {
            attach_directive(site, trimmed.to_string());
            continue;
        }

        let mut block = vec![trimmed.to_string()];
        let mut depth = 1usize;
        for (_, inner) in lines.by_ref() {
            block.push(inner.to_string());
            let inner = inner.trim();
            if inner == "}" {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            } else if inner.ends_with('{') {
                depth += 1;
            }
        }

        if depth > 0 {
            return Err(LabelError::UnterminatedDirective {
                line: index + 1,
                directive: trimmed.to_string(),
            });
        }
        attach_directive(site, block.join("\n"));
    }

    sites.extend(current);
    Ok(sites)
}

/// Collect the bindings of one listed container
///
/// Containers without the label contribute nothing. A label that fails to
/// parse is logged and contributes nothing either.
pub fn container_sites(container: &ContainerInfo, label: &str, network: &str) -> Vec<SiteConfig> {
    let Some(raw) = container.labels.get(label) else {
        return Vec::new();
    };
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let name = container.display_name();
    let proxy_ip = container.network_ips.get(network).map(String::as_str).unwrap_or("");

    match parse_label(raw, &name, proxy_ip) {
        Ok(sites) => sites,
        Err(e) => {
            warn!(container = %name, id = %container.id, error = %e, "Skipping container label");
            Vec::new()
        }
    }
}
