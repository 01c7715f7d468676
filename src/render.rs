//! Caddyfile rendering
//!
//! Bindings are grouped by hostname set and emitted in sorted key order so
//! the same containers always produce byte-identical output, whatever order
//! Docker lists them in. The reconciler relies on that to skip needless
//! reloads.

use crate::label::SiteConfig;
use std::collections::BTreeMap;

/// Prefix of the generated named matchers
const MATCHER_PREFIX: &str = "@caddy-gen-";

/// Bindings sharing one hostname set, in discovery order
pub type Group<'a> = Vec<&'a SiteConfig>;

/// Group bindings by their space-joined hostnames
///
/// Keys iterate in byte order; records keep their relative order inside a
/// group.
pub fn group_sites(sites: &[SiteConfig]) -> BTreeMap<String, Group<'_>> {
    let mut groups: BTreeMap<String, Group<'_>> = BTreeMap::new();
    for site in sites {
        groups.entry(site.group_key()).or_default().push(site);
    }
    groups
}

/// Render all bindings of one pass into a Caddyfile fragment
pub fn render(sites: &[SiteConfig]) -> String {
    group_sites(sites)
        .iter()
        .enumerate()
        .map(|(index, (hostnames, group))| render_group(index, hostnames, group))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_group(index: usize, hostnames: &str, group: &[&SiteConfig]) -> String {
    let matcher = format!("{}{}", MATCHER_PREFIX, index);
    let mut lines = vec![
        format!("{} host {}", matcher, hostnames),
        format!("handle {} {{", matcher),
    ];

    for site in group {
        for directive in &site.host_directives {
            lines.push(format!("  {}", directive));
        }
    }

    for site in group {
        lines.push(format!("  # {}", site.name));
        lines.push(format!("  reverse_proxy {} {{", site.path_matcher));
        for directive in &site.proxy_directives {
            lines.push(format!("    {}", directive));
        }
        lines.push(format!("    to {}:{}", site.proxy_ip, site.port));
        lines.push("  }".to_string());
    }

    lines.push("}".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(hostnames: &[&str], name: &str, ip: &str, port: u16) -> SiteConfig {
        SiteConfig {
            hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
            port,
            name: name.to_string(),
            proxy_ip: ip.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_render_single_site() {
        let mut web = site(&["example.com", "www.example.com"], "web", "10.0.0.2", 80);
        web.path_matcher = "/app".to_string();
        web.proxy_directives.push("header_up X-Real-IP {remote_host}".to_string());

        let expected = "\
@caddy-gen-0 host example.com www.example.com
handle @caddy-gen-0 {
  # web
  reverse_proxy /app {
    header_up X-Real-IP {remote_host}
    to 10.0.0.2:80
  }
}";
        assert_eq!(render(&[web]), expected);
    }

    #[test]
    fn test_render_shared_hostnames_share_one_block() {
        let mut first = site(&["a.com"], "one", "10.0.0.2", 80);
        first.host_directives.push("tls internal".to_string());
        let mut second = site(&["a.com"], "two", "10.0.0.3", 8080);
        second.path_matcher = "/api".to_string();
        second.host_directives.push("encode gzip".to_string());

        let expected = "\
@caddy-gen-0 host a.com
handle @caddy-gen-0 {
  tls internal
  encode gzip
  # one
  reverse_proxy  {
    to 10.0.0.2:80
  }
  # two
  reverse_proxy /api {
    to 10.0.0.3:8080
  }
}";
        let output = render(&[first, second]);
        assert_eq!(output, expected);
        assert_eq!(output.matches("handle ").count(), 1);
        assert_eq!(output.matches("reverse_proxy").count(), 2);
    }

    #[test]
    fn test_render_groups_sorted_and_separated() {
        let sites = vec![
            site(&["b.com"], "b", "10.0.0.3", 80),
            site(&["a.com"], "a", "10.0.0.2", 80),
        ];
        let output = render(&sites);
        let blocks: Vec<&str> = output.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("@caddy-gen-0 host a.com\n"));
        assert!(blocks[1].starts_with("@caddy-gen-1 host b.com\n"));
        assert!(!output.ends_with('\n'));
    }

    #[test]
    fn test_render_independent_of_discovery_order() {
        let a = site(&["a.com"], "a", "10.0.0.2", 80);
        let b = site(&["b.com"], "b", "10.0.0.3", 80);
        let c = site(&["c.com", "d.com"], "c", "10.0.0.4", 80);

        let forward = render(&[a.clone(), b.clone(), c.clone()]);
        let reversed = render(&[c, b, a]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_render_preserves_order_within_group() {
        let first = site(&["a.com"], "first", "10.0.0.2", 80);
        let second = site(&["a.com"], "second", "10.0.0.3", 80);

        let output = render(&[second.clone(), first.clone()]);
        let second_at = output.find("# second").unwrap();
        let first_at = output.find("# first").unwrap();
        assert!(second_at < first_at);
    }

    #[test]
    fn test_multiline_directive_indents_first_line_only() {
        let mut web = site(&["a.com"], "web", "10.0.0.2", 80);
        web.host_directives.push("tls {\ninternal\n}".to_string());

        let output = render(&[web]);
        assert!(output.contains("\n  tls {\ninternal\n}\n  # web\n"));
    }

    #[test]
    fn test_group_key_order_is_bytewise() {
        let sites = vec![
            site(&["b.com"], "b", "", 80),
            site(&["B.com"], "B", "", 80),
            site(&["a.com", "b.com"], "ab", "", 80),
        ];
        let keys: Vec<String> = group_sites(&sites).into_keys().collect();
        assert_eq!(keys, vec!["B.com", "a.com b.com", "b.com"]);
    }
}
