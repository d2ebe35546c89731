//! Backend URL selection.

use url::Url;

use super::ForwardError;
use crate::config::UpstreamConfig;
use crate::ogc::{OgcMessage, ServiceType};

const WMS_REFLECT_ENDPOINT: &str = "/reflect";

/// Picks the backend OWS URL for a call.
///
/// Namespace-bound mode matches the endpoint prefix (`topp` of `topp:states`)
/// case-insensitively and falls back to the default URL.
pub fn upstream_url(config: &UpstreamConfig, message: Option<&OgcMessage>) -> Result<Url, ForwardError> {
    let namespace = message.and_then(OgcMessage::endpoint_prefix);

    let bound = if config.namespace_bound_url {
        namespace.and_then(|ns| {
            config
                .namespaces
                .iter()
                .find(|candidate| candidate.namespace.eq_ignore_ascii_case(ns))
                .map(|candidate| candidate.url.as_str())
        })
    } else {
        None
    };

    let raw = bound
        .or(config.default_ows_url.as_deref())
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ForwardError::NoUpstream {
            namespace: namespace.map(str::to_string),
        })?;

    let url = Url::parse(raw).map_err(|e| ForwardError::InvalidUri(format!("{raw}: {e}")))?;

    match message {
        Some(m) if m.reflect && m.service == ServiceType::Wms => Ok(reflect(url)),
        _ => Ok(url),
    }
}

/// GeoServer WMS reflector: `.../ows` → `.../wms/reflect`, `.../wms` → `.../wms/reflect`.
pub fn reflect(mut url: Url) -> Url {
    let path = url.path().to_string();
    let lower = path.to_ascii_lowercase();
    if lower.ends_with("ows") {
        let base = &path[..path.len() - 3];
        url.set_path(&format!("{base}wms{WMS_REFLECT_ENDPOINT}"));
    } else if lower.ends_with("wms") {
        url.set_path(&format!("{path}{WMS_REFLECT_ENDPOINT}"));
    }
    url
}

/// Appends the call's (possibly rewritten) query to the backend URL.
pub fn with_query(mut url: Url, query: Option<&str>) -> Url {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return url;
    };
    let merged = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query.to_string(),
    };
    url.set_query(Some(&merged));
    url
}
