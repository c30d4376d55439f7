//! Registrable domains (eTLD+1) for third-party checks.
//!
//! The full public suffix list is optional. Until [`init_psl`] installs one,
//! hosts are split with a short table of well-known two-label suffixes.
//!
//! ```
//! use cb_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("cdn.example.com"), "example.com");
//! assert_eq!(get_etld1("shop.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use publicsuffix::{List, Psl};

#[derive(Debug, thiserror::Error)]
#[error("Invalid public suffix list: {0}")]
pub struct PslError(String);

/// Suffixes recognised without a loaded list.
const KNOWN_SECOND_LEVEL: &[&str] = &[
    "ac.jp", "ac.uk", "co.in", "co.jp", "co.kr", "co.nz", "co.uk", "co.za", "com.au", "com.br",
    "com.cn", "com.hk", "com.mx", "com.tr", "com.tw", "gov.au", "gov.uk", "ne.jp", "net.au",
    "net.nz", "or.jp", "org.au", "org.nz", "org.uk",
];

/// Installed list. Readers load it without locking.
static SUFFIX_LIST: ArcSwapOption<List> = ArcSwapOption::const_empty();

/// Install the public suffix list from `public_suffix_list.dat` text.
///
/// Replaces any list installed earlier. Lookups already running finish
/// against the list they loaded.
pub fn init_psl(list_text: &str) -> Result<(), PslError> {
    let list: List = list_text.parse().map_err(|e| PslError(format!("{e}")))?;
    SUFFIX_LIST.store(Some(Arc::new(list)));
    log::info!("Public suffix list installed");
    Ok(())
}

/// Registrable domain of `host`. IP literals and single labels come back
/// unchanged.
pub fn get_etld1(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || is_ip_literal(&host) {
        return host;
    }

    let list = SUFFIX_LIST.load();
    match list.as_deref() {
        Some(list) => list
            .domain(host.as_bytes())
            .and_then(|d| std::str::from_utf8(d.as_bytes()).ok().map(str::to_owned))
            .unwrap_or_else(|| host.clone()),
        None => heuristic_site(&host).to_owned(),
    }
}

fn heuristic_site(host: &str) -> &str {
    let dots: Vec<usize> = host.rmatch_indices('.').map(|(i, _)| i).take(3).collect();
    let keep = match dots.get(1) {
        None => return host,
        Some(&second) if KNOWN_SECOND_LEVEL.contains(&&host[second + 1..]) => 2,
        Some(_) => 1,
    };
    match dots.get(keep) {
        Some(&cut) => &host[cut + 1..],
        None => host,
    }
}

fn is_ip_literal(host: &str) -> bool {
    host.starts_with('[') || host.parse::<IpAddr>().is_ok()
}

/// True when the two hosts belong to different registrable domains.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    get_etld1(site_host) != get_etld1(req_host)
}

/// `a.b.example.com`, `b.example.com`, `example.com`, `com`.
pub fn walk_host_suffixes(host: &str) -> impl Iterator<Item = &str> {
    std::iter::successors((!host.is_empty()).then_some(host), |&h| {
        h.split_once('.').map(|(_, rest)| rest).filter(|rest| !rest.is_empty())
    })
}

/// `host` is `domain` or one of its subdomains.
#[inline]
pub fn is_subdomain_or_equal(host: &str, domain: &str) -> bool {
    match host.strip_suffix(domain) {
        Some("") => true,
        Some(prefix) => !domain.is_empty() && prefix.ends_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_keeps_one_label_above_the_suffix() {
        assert_eq!(heuristic_site("localhost"), "localhost");
        assert_eq!(heuristic_site("example.com"), "example.com");
        assert_eq!(heuristic_site("ads.cdn.example.com"), "example.com");
        assert_eq!(heuristic_site("example.co.uk"), "example.co.uk");
        assert_eq!(heuristic_site("img.example.co.uk"), "example.co.uk");
        assert_eq!(heuristic_site("co.uk"), "co.uk");
    }

    #[test]
    fn suffix_walk_ends_at_the_top_label() {
        let walked: Vec<&str> = walk_host_suffixes("a.example.com").collect();
        assert_eq!(walked, ["a.example.com", "example.com", "com"]);
        assert_eq!(walk_host_suffixes("").count(), 0);
        assert_eq!(walk_host_suffixes("example.com.").count(), 2);
    }

    #[test]
    fn subdomain_check_respects_label_boundaries() {
        assert!(is_subdomain_or_equal("example.com", "example.com"));
        assert!(is_subdomain_or_equal("news.example.com", "example.com"));
        assert!(!is_subdomain_or_equal("badexample.com", "example.com"));
        assert!(!is_subdomain_or_equal("example.com", "news.example.com"));
        assert!(!is_subdomain_or_equal("example.com", ""));
    }

    #[test]
    fn third_party_compares_registrable_domains() {
        assert!(!is_third_party("www.example.com", "ads.example.com"));
        assert!(is_third_party("example.com", "tracker.net"));
        assert!(is_third_party("a.co.uk", "b.co.uk"));
        assert_eq!(get_etld1("127.0.0.1"), "127.0.0.1");
        assert_eq!(get_etld1("WWW.Example.COM."), "example.com");
    }

    #[test]
    fn lookups_from_many_threads() {
        std::thread::scope(|scope| {
            for t in 0..8 {
                scope.spawn(move || {
                    for i in 0..500 {
                        let host = format!("h{i}.site{t}.example.com");
                        assert_eq!(get_etld1(&host), "example.com");
                    }
                });
            }
        });
    }
}
