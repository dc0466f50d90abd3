use axum::http::{header, HeaderMap, Uri};

pub const SUBDOMAIN_HEADER: &str = "x-subdomain";

/// Host labels that never name a store
const IGNORED_LABELS: [&str; 2] = ["www", "api"];

/// Where a subdomain was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdomainSource {
    Header,
    Host,
    Query,
    Referer,
}

/// Finds the store subdomain for a request.
///
/// Checked in order: `X-Subdomain` header, `Host`, `?subdomain=`, `Referer`.
pub fn resolve_subdomain(headers: &HeaderMap, uri: &Uri) -> Option<(String, SubdomainSource)> {
    from_header(headers)
        .map(|s| (s, SubdomainSource::Header))
        .or_else(|| from_host(headers).map(|s| (s, SubdomainSource::Host)))
        .or_else(|| from_query(uri).map(|s| (s, SubdomainSource::Query)))
        .or_else(|| from_referer(headers).map(|s| (s, SubdomainSource::Referer)))
}

fn normalize(raw: &str) -> Option<String> {
    let value = raw.trim().to_ascii_lowercase();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SUBDOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(normalize)
}

fn from_host(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
    first_label(host)
}

fn from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "subdomain")
        .and_then(|(_, value)| normalize(&value))
}

fn from_referer(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok())?;
    let parsed = url::Url::parse(referer).ok()?;
    first_label(parsed.host_str()?)
}

/// First DNS label of a host when it looks like `store.example.com`.
fn first_label(host: &str) -> Option<String> {
    let hostname = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    if !hostname.contains('.') || hostname.starts_with("localhost") {
        return None;
    }
    if hostname.parse::<std::net::Ipv4Addr>().is_ok() {
        return None;
    }

    let label = hostname.split('.').next()?;
    if label.is_empty() || IGNORED_LABELS.contains(&label) {
        return None;
    }
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn header_wins_over_everything() {
        let h = headers(&[
            ("x-subdomain", "Corner"),
            ("host", "other.retailos.app"),
            ("referer", "https://third.retailos.app/dashboard"),
        ]);
        let uri: Uri = "/api/v1/products?subdomain=fourth".parse().unwrap();
        assert_eq!(
            resolve_subdomain(&h, &uri),
            Some(("corner".to_string(), SubdomainSource::Header))
        );
    }

    #[test]
    fn host_then_query_then_referer() {
        let uri: Uri = "/api/v1/products?subdomain=fromquery".parse().unwrap();

        let h = headers(&[("host", "corner.retailos.app:8080")]);
        assert_eq!(
            resolve_subdomain(&h, &uri),
            Some(("corner".to_string(), SubdomainSource::Host))
        );

        let h = headers(&[("host", "localhost:8080")]);
        assert_eq!(
            resolve_subdomain(&h, &uri),
            Some(("fromquery".to_string(), SubdomainSource::Query))
        );

        let bare: Uri = "/api/v1/products".parse().unwrap();
        let h = headers(&[
            ("host", "localhost:8080"),
            ("referer", "https://bakery.retailos.app/inventory"),
        ]);
        assert_eq!(
            resolve_subdomain(&h, &bare),
            Some(("bakery".to_string(), SubdomainSource::Referer))
        );
    }

    #[rstest]
    #[case("www.retailos.app")]
    #[case("api.retailos.app")]
    #[case("localhost")]
    #[case("localhost.localdomain")]
    #[case("127.0.0.1:8080")]
    #[case("retailos")]
    fn hosts_that_name_no_store(#[case] host: &str) {
        assert_eq!(first_label(host), None);
    }

    #[test]
    fn nothing_resolves_to_none() {
        let uri: Uri = "/api/v1/products".parse().unwrap();
        assert_eq!(resolve_subdomain(&HeaderMap::new(), &uri), None);
    }

    #[test]
    fn blank_header_falls_through() {
        let h = headers(&[("x-subdomain", "  ")]);
        let uri: Uri = "/x?subdomain=deli".parse().unwrap();
        assert_eq!(
            resolve_subdomain(&h, &uri),
            Some(("deli".to_string(), SubdomainSource::Query))
        );
    }
}
